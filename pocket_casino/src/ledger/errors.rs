//! Ledger error types.

use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Debit larger than the current balance
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    /// Amount of zero, or too large to record as a signed delta
    #[error("Invalid amount: {0}")]
    InvalidAmount(u64),

    /// Credit would exceed the representable balance
    #[error("Balance overflow: {balance} + {amount}")]
    BalanceOverflow { balance: u64, amount: u64 },

    /// The persistence worker is no longer running
    #[error("Ledger persistence worker stopped")]
    WorkerStopped,
}

impl LedgerError {
    /// Get a message suitable for showing to the player
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::InsufficientFunds { .. } => "Not enough credits".to_string(),
            LedgerError::WorkerStopped => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
