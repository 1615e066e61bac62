//! # Pocket Casino
//!
//! A single-player casino built around two pieces: a wager ledger that owns the
//! one credit balance every game draws against, and a parametrized
//! outcome/payout engine that every slot variant shares.
//!
//! ## Architecture
//!
//! - **Ledger**: atomic debit/credit, an immutable transaction history,
//!   change notifications and last-writer-wins reconciliation. Writes go to a
//!   background persistence worker that retries with backoff.
//! - **Engine**: weighted grid generation, pattern evaluation under a match
//!   policy, tiered payouts and an ordered chain of modifiers.
//! - **Sessions**: slots, blackjack, craps, roulette and video poker, each
//!   following `debit → resolve → credit` against the shared ledger. Sessions
//!   are dispatched through the [`GameSession`] enum using `enum_dispatch`.
//! - **Store**: in-memory, JSON file and PostgreSQL backends behind one trait.
//!
//! ## Core Modules
//!
//! - [`ledger`]: the authoritative balance
//! - [`engine`]: outcome generation and payout calculation
//! - [`game`]: game session state machines
//! - [`store`]: persistence backends
//! - [`casino`]: wiring of store, ledger and sessions
//!
//! ## Example
//!
//! ```no_run
//! use pocket_casino::{Casino, CasinoConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pocket_casino::CasinoError> {
//!     let casino = Casino::open(CasinoConfig::in_memory()).await?;
//!     let mut slots = casino.open_slots("advanced", None).await?;
//!
//!     let report = slots.spin(10).await?;
//!     println!("won {}, balance {}", report.outcome.payout, report.balance);
//!
//!     casino.shutdown().await
//! }
//! ```

/// Casino service wiring the store, the ledger and game sessions.
pub mod casino;
pub use casino::{Casino, CasinoError, CasinoResult};

/// Configuration loaded from the environment.
pub mod config;
pub use config::{CasinoConfig, ConfigError, PersistenceConfig, StoreBackend};

/// PostgreSQL connection pooling.
pub mod db;

/// Weighted outcome generation, pattern evaluation and payouts.
pub mod engine;
pub use engine::{EngineError, SlotVariant};

/// Game session state machines.
pub mod game;
pub use game::{GameKind, GameSession, SessionError, SessionInfo};

/// The authoritative credit balance.
pub mod ledger;
pub use ledger::{Ledger, LedgerError};

/// Persistence backends.
pub mod store;
pub use store::{StateStore, StoreError};
