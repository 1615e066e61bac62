//! Cold-start loading of the persisted casino state.
//!
//! Missing keys are seeded with their defaults and written back immediately.
//! A key whose stored value cannot be parsed falls back to its default and is
//! repaired on the spot. If the store cannot be reached at all, defaults are
//! used in memory with a write time at the Unix epoch, so the first successful
//! poll of the store adopts whatever it holds.

use super::{StateKey, StateStore, StoredValue, with_timeout};
use chrono::{DateTime, Utc};
use std::{str::FromStr, time::Duration};

/// Balance granted on first launch
pub const DEFAULT_BALANCE: u64 = 1000;

/// Wager preselected when nothing else was chosen
pub const DEFAULT_WAGER: u64 = 10;

/// State restored at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedState {
    pub balance: u64,
    pub balance_written_at: DateTime<Utc>,
    pub default_wager: u64,
    pub last_active_game: Option<String>,
}

/// Load every persisted key, seeding and repairing as needed
///
/// Never fails: every problem is logged and replaced by a default.
pub async fn load_state(store: &dyn StateStore, timeout: Duration) -> PersistedState {
    let (balance, balance_written_at) =
        load_or_seed(store, StateKey::Balance, DEFAULT_BALANCE, timeout).await;
    let (default_wager, _) =
        load_or_seed(store, StateKey::DefaultWager, DEFAULT_WAGER, timeout).await;
    let last_active_game = load_last_active_game(store, timeout).await;

    PersistedState {
        balance,
        balance_written_at,
        default_wager,
        last_active_game,
    }
}

async fn load_or_seed<T>(
    store: &dyn StateStore,
    key: StateKey,
    default: T,
    timeout: Duration,
) -> (T, DateTime<Utc>)
where
    T: FromStr + ToString + Copy,
    T::Err: std::fmt::Display,
{
    match with_timeout(timeout, store.load(key)).await {
        Ok(Some(stored)) => match stored.value.trim().parse::<T>() {
            Ok(value) => (value, stored.written_at),
            Err(e) => {
                log::warn!(
                    "Corrupted persisted state for '{}' ({:?}: {}), resetting to {}",
                    key,
                    stored.value,
                    e,
                    default.to_string()
                );
                (default, write_default(store, key, default, timeout).await)
            }
        },
        Ok(None) => {
            log::info!("No persisted '{}', seeding with {}", key, default.to_string());
            (default, write_default(store, key, default, timeout).await)
        }
        Err(e) if e.is_corruption() => {
            log::warn!("Corrupted persisted state for '{}': {}", key, e);
            (default, write_default(store, key, default, timeout).await)
        }
        Err(e) => {
            log::warn!(
                "Could not read '{}' ({}), using {} until the store is reachable",
                key,
                e,
                default.to_string()
            );
            (default, DateTime::<Utc>::UNIX_EPOCH)
        }
    }
}

async fn write_default<T: ToString>(
    store: &dyn StateStore,
    key: StateKey,
    default: T,
    timeout: Duration,
) -> DateTime<Utc> {
    let written_at = Utc::now();
    if let Err(e) = with_timeout(
        timeout,
        store.save(key, StoredValue::new(default.to_string(), written_at)),
    )
    .await
    {
        log::warn!("Failed to persist default for '{}': {}", key, e);
    }
    written_at
}

async fn load_last_active_game(store: &dyn StateStore, timeout: Duration) -> Option<String> {
    match with_timeout(timeout, store.load(StateKey::LastActiveGame)).await {
        Ok(Some(stored)) if !stored.value.trim().is_empty() => Some(stored.value),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Could not read '{}': {}", StateKey::LastActiveGame, e);
            None
        }
    }
}
