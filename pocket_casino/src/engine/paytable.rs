//! Weighted symbol tables.

use super::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

/// Default allowed deviation of a probability sum from 1
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Identifier of a reel symbol
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SymbolId(pub u16);

impl SymbolId {
    /// Blank cell (e.g. glitched or frozen); never matches anything, itself included
    pub const VOID: SymbolId = SymbolId(u16::MAX);

    pub fn is_void(self) -> bool {
        self == Self::VOID
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_void() {
            write!(f, "--")
        } else {
            write!(f, "{:02}", self.0)
        }
    }
}

/// One row of a paytable
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PaytableEntry {
    pub symbol: SymbolId,
    pub name: String,
    /// Per-credit value used as the base multiplier of a match
    pub value: u64,
    pub probability: f64,
}

impl PaytableEntry {
    pub fn new(symbol: u16, name: &str, value: u64, probability: f64) -> Self {
        Self {
            symbol: SymbolId(symbol),
            name: name.to_string(),
            value,
            probability,
        }
    }
}

/// A validated paytable
///
/// Validation happens once, here; drawing from a `Paytable` never re-checks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Paytable {
    entries: Vec<PaytableEntry>,
    #[serde(skip)]
    cumulative: Vec<f64>,
}

impl Paytable {
    /// Validate entries and build the cumulative distribution
    ///
    /// # Errors
    ///
    /// * `EngineError::MalformedPaytable` - no entries, a negative or non-finite
    ///   probability, the reserved void symbol, or a duplicated symbol
    /// * `EngineError::InvalidPaytable` - probabilities do not sum to 1 ± `tolerance`
    pub fn new(entries: Vec<PaytableEntry>, tolerance: f64) -> EngineResult<Self> {
        if entries.is_empty() {
            return Err(EngineError::MalformedPaytable("no entries".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !entry.probability.is_finite() || entry.probability < 0.0 {
                return Err(EngineError::MalformedPaytable(format!(
                    "symbol '{}' has probability {}",
                    entry.name, entry.probability
                )));
            }
            if entry.symbol.is_void() {
                return Err(EngineError::MalformedPaytable(format!(
                    "symbol '{}' uses the reserved void id",
                    entry.name
                )));
            }
            if !seen.insert(entry.symbol) {
                return Err(EngineError::MalformedPaytable(format!(
                    "symbol {} listed twice",
                    entry.symbol
                )));
            }
        }

        let sum: f64 = entries.iter().map(|e| e.probability).sum();
        if (sum - 1.0).abs() > tolerance {
            return Err(EngineError::InvalidPaytable { sum, tolerance });
        }

        let cumulative = entries
            .iter()
            .scan(0.0, |acc, entry| {
                *acc += entry.probability;
                Some(*acc)
            })
            .collect();

        Ok(Self {
            entries,
            cumulative,
        })
    }

    pub fn entries(&self) -> &[PaytableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Symbol whose cumulative range contains `u` (in `[0, 1)`)
    ///
    /// The last entry catches anything past the final boundary, so rounding in
    /// the cumulative sums can never leave `u` unassigned.
    pub fn pick(&self, u: f64) -> SymbolId {
        let index = self
            .cumulative
            .partition_point(|&boundary| boundary <= u)
            .min(self.entries.len() - 1);
        self.entries[index].symbol
    }

    /// Value of a symbol; zero for void or unknown symbols
    pub fn value_of(&self, symbol: SymbolId) -> u64 {
        self.entry(symbol).map_or(0, |e| e.value)
    }

    /// Display name of a symbol
    pub fn name_of(&self, symbol: SymbolId) -> &str {
        self.entry(symbol).map_or("void", |e| e.name.as_str())
    }

    pub fn entry(&self, symbol: SymbolId) -> Option<&PaytableEntry> {
        self.entries.iter().find(|e| e.symbol == symbol)
    }
}
