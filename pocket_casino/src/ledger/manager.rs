//! Ledger implementation: the single authoritative credit balance.

use super::{
    errors::{LedgerError, LedgerResult},
    models::{
        BalanceChange, BalanceSnapshot, ReconcileDecision, Transaction, TransactionCause,
        reconcile_decision, signed_delta,
    },
    persistence::{PersistCommand, PersistenceWorker},
};
use crate::{
    config::CasinoConfig,
    store::{StateKey, StateStore, StoredValue},
};
use chrono::{DateTime, Duration, Utc};
use std::{collections::VecDeque, sync::Arc};
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    task::JoinHandle,
};

/// Capacity of the change-notification channel
const EVENT_CAPACITY: usize = 256;

struct LedgerState {
    balance: u64,
    /// Strictly increasing across local mutations
    last_write: DateTime<Utc>,
    history: VecDeque<Transaction>,
}

impl LedgerState {
    fn next_write_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        if now > self.last_write {
            now
        } else {
            self.last_write + Duration::microseconds(1)
        }
    }
}

/// Handle to the ledger
///
/// Cloning is cheap and every clone refers to the same balance; each game
/// session receives its own clone. All mutations go through [`Ledger::debit`]
/// and [`Ledger::credit`] (or their `_for` variants), each of which is one
/// atomic read-compute-write.
#[derive(Clone)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,
    persist: mpsc::UnboundedSender<PersistCommand>,
    events: broadcast::Sender<BalanceChange>,
    history_limit: usize,
}

impl Ledger {
    /// Create a ledger and the worker that persists it
    ///
    /// # Arguments
    ///
    /// * `store` - Backend the worker writes to
    /// * `opening` - Balance restored at startup and when it was written
    /// * `config` - Persistence and history settings
    ///
    /// # Returns
    ///
    /// * `(Ledger, PersistenceWorker)` - The worker must be spawned for writes to happen
    pub fn open(
        store: Arc<dyn StateStore>,
        opening: BalanceSnapshot,
        config: &CasinoConfig,
    ) -> (Self, PersistenceWorker) {
        let (persist, inbox) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let ledger = Self {
            state: Arc::new(Mutex::new(LedgerState {
                balance: opening.balance,
                last_write: opening.written_at,
                history: VecDeque::new(),
            })),
            persist,
            events,
            history_limit: config.history_limit.max(1),
        };
        let worker = PersistenceWorker::new(store, inbox, config.persistence.clone());

        (ledger, worker)
    }

    /// Current in-memory balance
    pub async fn balance(&self) -> u64 {
        self.state.lock().await.balance
    }

    /// Current balance together with the time of its last write
    pub async fn snapshot(&self) -> BalanceSnapshot {
        let state = self.state.lock().await;
        BalanceSnapshot {
            balance: state.balance,
            written_at: state.last_write,
        }
    }

    /// Take `amount` credits as a wager
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - `amount` is zero or exceeds `i64::MAX`
    /// * `LedgerError::InsufficientFunds` - `amount` is larger than the balance;
    ///   nothing is taken
    pub async fn debit(&self, amount: u64) -> LedgerResult<u64> {
        self.debit_for(amount, None).await
    }

    /// Debit attributed to a game
    pub async fn debit_for(&self, amount: u64, game: Option<&str>) -> LedgerResult<u64> {
        if amount == 0 || i64::try_from(amount).is_err() {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;
        if amount > state.balance {
            return Err(LedgerError::InsufficientFunds {
                available: state.balance,
                required: amount,
            });
        }

        let balance = state.balance - amount;
        Ok(self.commit(&mut state, balance, TransactionCause::Wager, game))
    }

    /// Add `amount` credits as a payout; crediting zero is a no-op
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - `amount` exceeds `i64::MAX`
    /// * `LedgerError::BalanceOverflow` - the balance would exceed `u64::MAX`
    pub async fn credit(&self, amount: u64) -> LedgerResult<u64> {
        self.credit_for(amount, TransactionCause::Payout, None).await
    }

    /// Credit attributed to a game, with an explicit cause
    pub async fn credit_for(
        &self,
        amount: u64,
        cause: TransactionCause,
        game: Option<&str>,
    ) -> LedgerResult<u64> {
        if i64::try_from(amount).is_err() {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut state = self.state.lock().await;
        if amount == 0 {
            return Ok(state.balance);
        }

        let balance = state
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow {
                balance: state.balance,
                amount,
            })?;
        Ok(self.commit(&mut state, balance, cause, game))
    }

    /// Compare against a persisted balance and resolve with last-writer-wins
    ///
    /// A persisted value written after the ledger's last write that differs
    /// from the cached balance is adopted, recorded as a
    /// [`TransactionCause::Reconcile`] transaction and broadcast. Otherwise the
    /// in-memory balance is authoritative and is queued to be written again.
    pub async fn reconcile(&self, persisted: u64, persisted_at: DateTime<Utc>) -> ReconcileDecision {
        let mut state = self.state.lock().await;
        let decision = reconcile_decision(state.balance, state.last_write, persisted, persisted_at);

        match decision {
            ReconcileDecision::Adopt => {
                let previous = state.balance;
                log::info!(
                    "Adopting persisted balance {} (cached {}) written at {}",
                    persisted,
                    previous,
                    persisted_at
                );

                state.balance = persisted;
                state.last_write = persisted_at;
                let transaction = Transaction::new(
                    signed_delta(previous, persisted),
                    persisted,
                    TransactionCause::Reconcile,
                    None,
                    persisted_at,
                );
                self.remember(&mut state, transaction.clone());
                self.queue(PersistCommand::Journal(transaction));
                let _ = self.events.send(BalanceChange {
                    previous,
                    balance: persisted,
                    cause: TransactionCause::Reconcile,
                    at: persisted_at,
                });
            }
            ReconcileDecision::KeepLocal => {
                log::debug!(
                    "Persisted balance {} is stale, rewriting {}",
                    persisted,
                    state.balance
                );
                self.queue(PersistCommand::Snapshot(BalanceSnapshot {
                    balance: state.balance,
                    written_at: state.last_write,
                }));
            }
            ReconcileDecision::InSync => {}
        }

        decision
    }

    /// Receive a [`BalanceChange`] after every successful mutation
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceChange> {
        self.events.subscribe()
    }

    /// Call `listener` for every balance change until the ledger is dropped
    ///
    /// The returned task can be aborted to unregister the listener.
    pub fn on_balance_changed<F>(&self, listener: F) -> JoinHandle<()>
    where
        F: Fn(&BalanceChange) + Send + 'static,
    {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(change) => listener(&change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Balance listener lagged, skipped {} changes", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Most recent transactions, oldest first
    pub async fn history(&self, limit: usize) -> Vec<Transaction> {
        let state = self.state.lock().await;
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Queue a write of a non-balance key (`None` removes it)
    pub(crate) fn save_setting(&self, key: StateKey, value: Option<String>) {
        let value = value.map(|v| StoredValue::new(v, Utc::now()));
        self.queue(PersistCommand::Setting { key, value });
    }

    /// Wait until everything queued so far has been written (or given up on)
    ///
    /// # Errors
    ///
    /// * `LedgerError::WorkerStopped` - the persistence worker is not running
    pub async fn flush(&self) -> LedgerResult<()> {
        let (sender, receiver) = oneshot::channel();
        self.persist
            .send(PersistCommand::Flush(sender))
            .map_err(|_| LedgerError::WorkerStopped)?;
        receiver.await.map_err(|_| LedgerError::WorkerStopped)
    }

    /// Apply a new balance under the held lock: record, persist, notify
    fn commit(
        &self,
        state: &mut LedgerState,
        balance: u64,
        cause: TransactionCause,
        game: Option<&str>,
    ) -> u64 {
        let previous = state.balance;
        let at = state.next_write_time();
        state.balance = balance;
        state.last_write = at;

        let transaction = Transaction::new(
            signed_delta(previous, balance),
            balance,
            cause,
            game.map(str::to_string),
            at,
        );
        log::debug!(
            "Ledger {} {:+} -> {}{}",
            cause,
            transaction.delta,
            balance,
            game.map(|g| format!(" ({g})")).unwrap_or_default()
        );

        self.remember(state, transaction.clone());
        self.queue(PersistCommand::Record {
            snapshot: BalanceSnapshot {
                balance,
                written_at: at,
            },
            transaction,
        });
        let _ = self.events.send(BalanceChange {
            previous,
            balance,
            cause,
            at,
        });

        balance
    }

    fn remember(&self, state: &mut LedgerState, transaction: Transaction) {
        state.history.push_back(transaction);
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }
    }

    fn queue(&self, command: PersistCommand) {
        if self.persist.send(command).is_err() {
            log::warn!("Ledger persistence worker is gone, change kept in memory only");
        }
    }
}
