//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Why the balance moved
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCause {
    /// Stake taken for a round
    Wager,
    /// Winnings credited after a round
    Payout,
    /// Stake handed back on a push
    Refund,
    /// Balance adopted from a newer persisted value
    Reconcile,
}

impl fmt::Display for TransactionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Wager => "wager",
            Self::Payout => "payout",
            Self::Refund => "refund",
            Self::Reconcile => "reconcile",
        };
        write!(f, "{repr}")
    }
}

impl FromStr for TransactionCause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wager" => Ok(Self::Wager),
            "payout" => Ok(Self::Payout),
            "refund" => Ok(Self::Refund),
            "reconcile" => Ok(Self::Reconcile),
            other => Err(format!("unknown transaction cause '{other}'")),
        }
    }
}

/// An immutable record of one balance mutation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id; stores use it to ignore duplicate appends
    pub id: Uuid,
    /// Signed change applied to the balance
    pub delta: i64,
    pub balance_after: u64,
    pub cause: TransactionCause,
    /// Game that caused the mutation, if any
    pub game: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        delta: i64,
        balance_after: u64,
        cause: TransactionCause,
        game: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            delta,
            balance_after,
            cause,
            game,
            timestamp,
        }
    }
}

/// Balance value together with the time it was written
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: u64,
    pub written_at: DateTime<Utc>,
}

/// Notification sent to subscribers after every successful mutation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceChange {
    pub previous: u64,
    pub balance: u64,
    pub cause: TransactionCause,
    pub at: DateTime<Utc>,
}

/// Outcome of comparing a cached balance with a persisted one
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// Persisted value is newer and different: take it
    Adopt,
    /// Cached value wins and should be written back
    KeepLocal,
    /// Both sides already agree
    InSync,
}

/// Last-writer-wins comparison shared by the ledger and display readers
///
/// A persisted value replaces the cached one only when it was written strictly
/// later and differs. Equal values are in sync regardless of timestamps.
pub fn reconcile_decision(
    local: u64,
    local_at: DateTime<Utc>,
    persisted: u64,
    persisted_at: DateTime<Utc>,
) -> ReconcileDecision {
    if persisted == local {
        ReconcileDecision::InSync
    } else if persisted_at > local_at {
        ReconcileDecision::Adopt
    } else {
        ReconcileDecision::KeepLocal
    }
}

/// Signed difference `to - from`, saturating at the `i64` range
pub(crate) fn signed_delta(from: u64, to: u64) -> i64 {
    if to >= from {
        i64::try_from(to - from).unwrap_or(i64::MAX)
    } else {
        i64::try_from(from - to).map(|d| -d).unwrap_or(i64::MIN)
    }
}
