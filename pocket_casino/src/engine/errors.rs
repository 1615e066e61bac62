//! Outcome engine error types.

use thiserror::Error;

/// Configuration errors raised while building or evaluating a game
///
/// All of these describe a broken game definition, not a runtime condition:
/// a variant that produces one cannot be played until it is corrected.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Probabilities do not sum to 1 within tolerance
    #[error("invalid paytable: probabilities sum to {sum}, expected 1 ± {tolerance}")]
    InvalidPaytable { sum: f64, tolerance: f64 },

    /// Paytable entries are unusable regardless of their sum
    #[error("malformed paytable: {0}")]
    MalformedPaytable(String),

    /// Grid shape with no cells
    #[error("invalid grid: {reels} reels x {rows} rows")]
    InvalidGrid { reels: usize, rows: usize },

    /// A line references a cell outside the grid
    #[error("line {line_id} leaves the grid at reel {reel}, row {row}")]
    LineOutOfBounds { line_id: u32, reel: usize, row: usize },

    /// A line has no cells or a malformed shape
    #[error("invalid line {line_id}: {reason}")]
    InvalidLine { line_id: u32, reason: String },

    /// A tier table or modifier that cannot be applied
    #[error("invalid payout rule: {0}")]
    InvalidPayoutRule(String),

    /// No variant with that name
    #[error("unknown variant '{0}'")]
    UnknownVariant(String),

    /// Variant definition could not be parsed
    #[error("variant definition error: {0}")]
    Definition(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Definition(e.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
