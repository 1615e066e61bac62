//! Durable key/value storage for the casino's persisted state.
//!
//! Three keys are persisted, each as a decimal (or plain) string together with
//! the time it was written:
//!
//! - `balance`: the player's credit balance
//! - `defaultWager`: the wager preselected when a game opens
//! - `lastActiveGame`: identifier of the last game played (absent = none)
//!
//! Backends additionally keep an append-only journal of ledger transactions.
//! Appending a transaction whose id is already stored is a no-op, so the
//! persistence worker can retry a batch without duplicating entries.

use crate::ledger::Transaction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

pub mod file;
pub mod memory;
pub mod postgres;
pub mod state;
pub mod timeouts;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use state::{DEFAULT_BALANCE, DEFAULT_WAGER, PersistedState, load_state};
pub use timeouts::with_timeout;

/// Persisted keys
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum StateKey {
    #[serde(rename = "balance")]
    Balance,
    #[serde(rename = "defaultWager")]
    DefaultWager,
    #[serde(rename = "lastActiveGame")]
    LastActiveGame,
}

impl StateKey {
    pub const ALL: [StateKey; 3] = [
        StateKey::Balance,
        StateKey::DefaultWager,
        StateKey::LastActiveGame,
    ];

    /// Key name as written to storage
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::DefaultWager => "defaultWager",
            Self::LastActiveGame => "lastActiveGame",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StateKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| StoreError::Corrupted {
                key: s.to_string(),
                reason: "unknown key".to_string(),
            })
    }
}

/// A persisted value and the time it was written
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: String,
    pub written_at: DateTime<Utc>,
}

impl StoredValue {
    pub fn new(value: impl ToString, written_at: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            written_at,
        }
    }
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is present but unreadable
    #[error("Corrupted persisted state for '{key}': {reason}")]
    Corrupted { key: String, reason: String },

    /// A write did not complete in time
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Backend refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the error means stored data is unreadable rather than unreachable
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Corrupted { .. } | StoreError::Serialization(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key/value persistence backend
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a key; `None` when it was never written
    async fn load(&self, key: StateKey) -> StoreResult<Option<StoredValue>>;

    /// Write (or overwrite) a key
    async fn save(&self, key: StateKey, value: StoredValue) -> StoreResult<()>;

    /// Delete a key; deleting a missing key succeeds
    async fn remove(&self, key: StateKey) -> StoreResult<()>;

    /// Append transactions to the journal, skipping ids already present
    async fn append_transactions(&self, transactions: &[Transaction]) -> StoreResult<()>;

    /// Most recent `limit` journal entries, oldest first
    async fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key_names() {
        assert_eq!(StateKey::Balance.to_string(), "balance");
        assert_eq!(StateKey::DefaultWager.to_string(), "defaultWager");
        assert_eq!(StateKey::LastActiveGame.to_string(), "lastActiveGame");
    }

    #[test]
    fn test_state_key_parse() {
        for key in StateKey::ALL {
            assert_eq!(key.as_str().parse::<StateKey>().unwrap(), key);
        }
        assert!("credits".parse::<StateKey>().is_err());
    }

    #[test]
    fn test_corruption_classification() {
        let corrupted = StoreError::Corrupted {
            key: "balance".to_string(),
            reason: "not a number".to_string(),
        };
        assert!(corrupted.is_corruption());
        assert!(!StoreError::Unavailable("down".to_string()).is_corruption());
        assert!(!StoreError::Timeout(Duration::from_secs(1)).is_corruption());
    }
}
