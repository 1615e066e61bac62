//! Wager ledger: the single authoritative credit balance.
//!
//! This module provides:
//! - Atomic debit/credit with a strict non-negative balance
//! - An immutable transaction history, journaled by the persistence worker
//! - Change notifications for display readers
//! - Last-writer-wins reconciliation against persisted values
//!
//! # Example
//!
//! ```no_run
//! use pocket_casino::{
//!     config::CasinoConfig,
//!     ledger::{BalanceSnapshot, Ledger},
//!     store::MemoryStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let opening = BalanceSnapshot { balance: 1000, written_at: chrono::Utc::now() };
//!     let (ledger, worker) =
//!         Ledger::open(Arc::new(MemoryStore::new()), opening, &CasinoConfig::in_memory());
//!     tokio::spawn(worker.run());
//!
//!     ledger.debit(10).await.unwrap();
//!     ledger.credit(25).await.unwrap();
//!     assert_eq!(ledger.balance().await, 1015);
//!     ledger.flush().await.unwrap();
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod mirror;
pub mod models;
pub mod persistence;

pub use errors::{LedgerError, LedgerResult};
pub use manager::Ledger;
pub use mirror::{BalanceMirror, MirrorHandle};
pub use models::{
    BalanceChange, BalanceSnapshot, ReconcileDecision, Transaction, TransactionCause,
    reconcile_decision,
};
pub use persistence::PersistenceWorker;
