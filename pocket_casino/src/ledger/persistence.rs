//! Background writer that makes ledger mutations durable.
//!
//! The ledger never waits for storage. Every mutation is pushed onto an
//! unbounded channel and this worker writes it out: queued balance snapshots
//! collapse into the newest one, transactions are all kept, and failed writes
//! are retried with exponential backoff. A failure never rolls back memory.

use super::models::{BalanceSnapshot, Transaction};
use crate::{
    config::PersistenceConfig,
    store::{StateKey, StateStore, StoreResult, StoredValue, with_timeout},
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};

/// Work queued for the persistence worker
#[derive(Debug)]
pub(crate) enum PersistCommand {
    /// A mutation: new balance plus its journal entry
    Record {
        snapshot: BalanceSnapshot,
        transaction: Transaction,
    },
    /// Rewrite the balance without a journal entry
    Snapshot(BalanceSnapshot),
    /// Journal entry without a balance write
    Journal(Transaction),
    /// Write or remove (`None`) a non-balance key
    Setting {
        key: StateKey,
        value: Option<StoredValue>,
    },
    /// Reply once everything queued before it is written
    Flush(oneshot::Sender<()>),
}

/// Persistence worker draining the ledger's write queue
pub struct PersistenceWorker {
    store: Arc<dyn StateStore>,
    inbox: mpsc::UnboundedReceiver<PersistCommand>,
    config: PersistenceConfig,
    snapshot: Option<BalanceSnapshot>,
    transactions: Vec<Transaction>,
    settings: BTreeMap<StateKey, Option<StoredValue>>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl PersistenceWorker {
    pub(crate) fn new(
        store: Arc<dyn StateStore>,
        inbox: mpsc::UnboundedReceiver<PersistCommand>,
        config: PersistenceConfig,
    ) -> Self {
        Self {
            store,
            inbox,
            config,
            snapshot: None,
            transactions: Vec::new(),
            settings: BTreeMap::new(),
            waiters: Vec::new(),
        }
    }

    /// Run until every ledger handle has been dropped
    pub async fn run(mut self) {
        log::info!("Ledger persistence worker starting");

        while let Some(command) = self.inbox.recv().await {
            self.absorb(command);
            self.drain_queued();
            self.write_pending().await;

            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }

        log::info!("Ledger persistence worker stopped");
    }

    fn absorb(&mut self, command: PersistCommand) {
        match command {
            PersistCommand::Record {
                snapshot,
                transaction,
            } => {
                self.snapshot = Some(snapshot);
                self.transactions.push(transaction);
            }
            PersistCommand::Snapshot(snapshot) => self.snapshot = Some(snapshot),
            PersistCommand::Journal(transaction) => self.transactions.push(transaction),
            PersistCommand::Setting { key, value } => {
                self.settings.insert(key, value);
            }
            PersistCommand::Flush(waiter) => self.waiters.push(waiter),
        }
    }

    fn drain_queued(&mut self) {
        while let Ok(command) = self.inbox.try_recv() {
            self.absorb(command);
        }
    }

    fn has_pending(&self) -> bool {
        self.snapshot.is_some() || !self.transactions.is_empty() || !self.settings.is_empty()
    }

    async fn write_pending(&mut self) {
        let mut attempt: u32 = 0;

        while self.has_pending() {
            let Err(e) = self.try_write().await else {
                return;
            };

            attempt += 1;
            if self
                .config
                .max_attempts
                .is_some_and(|max_attempts| attempt >= max_attempts)
            {
                log::error!(
                    "Giving up on ledger write after {} attempts: {} (balance {:?}, {} transactions dropped)",
                    attempt,
                    e,
                    self.snapshot.map(|s| s.balance),
                    self.transactions.len()
                );
                self.snapshot = None;
                self.transactions.clear();
                self.settings.clear();
                return;
            }

            let delay = backoff_delay(&self.config, attempt);
            log::warn!(
                "Ledger write failed (attempt {}): {}; retrying in {:?}",
                attempt,
                e,
                delay
            );
            tokio::time::sleep(delay).await;

            // Retry with whatever arrived meanwhile so the newest balance wins.
            self.drain_queued();
        }
    }

    /// Write everything pending; each part is cleared as soon as it lands
    async fn try_write(&mut self) -> StoreResult<()> {
        let timeout = self.config.write_timeout;

        if !self.transactions.is_empty() {
            with_timeout(timeout, self.store.append_transactions(&self.transactions)).await?;
            log::debug!("Journaled {} ledger transactions", self.transactions.len());
            self.transactions.clear();
        }

        if let Some(snapshot) = self.snapshot {
            let value = StoredValue::new(snapshot.balance, snapshot.written_at);
            with_timeout(timeout, self.store.save(StateKey::Balance, value)).await?;
            self.snapshot = None;
        }

        while let Some((key, value)) = self.settings.pop_first() {
            let result = match &value {
                Some(stored) => with_timeout(timeout, self.store.save(key, stored.clone())).await,
                None => with_timeout(timeout, self.store.remove(key)).await,
            };
            if let Err(e) = result {
                self.settings.insert(key, value);
                return Err(e);
            }
        }

        Ok(())
    }
}

/// Retry delay for the given (1-based) attempt: base doubled per attempt, capped
pub(crate) fn backoff_delay(config: &PersistenceConfig, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    config
        .retry_base
        .saturating_mul(factor)
        .min(config.retry_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::TransactionCause, store::MemoryStore};
    use chrono::Utc;

    fn config() -> PersistenceConfig {
        PersistenceConfig {
            retry_base: Duration::from_millis(1),
            retry_max: Duration::from_millis(8),
            max_attempts: None,
            write_timeout: Duration::from_secs(1),
        }
    }

    fn record(balance: u64) -> PersistCommand {
        let at = Utc::now();
        PersistCommand::Record {
            snapshot: BalanceSnapshot {
                balance,
                written_at: at,
            },
            transaction: Transaction::new(0, balance, TransactionCause::Payout, None, at),
        }
    }

    async fn flush(sender: &mpsc::UnboundedSender<PersistCommand>) {
        let (tx, rx) = oneshot::channel();
        sender.send(PersistCommand::Flush(tx)).unwrap();
        rx.await.unwrap();
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = PersistenceConfig {
            retry_base: Duration::from_millis(50),
            retry_max: Duration::from_millis(300),
            ..config()
        };
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(50));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(300));
        assert_eq!(backoff_delay(&config, 60), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_queued_snapshots_collapse_into_newest() {
        let store = MemoryStore::new();
        let (sender, inbox) = mpsc::unbounded_channel();
        let worker = PersistenceWorker::new(Arc::new(store.clone()), inbox, config());

        // Queue before the worker runs so everything lands in one batch.
        for balance in [990, 980, 970] {
            sender.send(record(balance)).unwrap();
        }
        tokio::spawn(worker.run());
        flush(&sender).await;

        let stored = store.load(StateKey::Balance).await.unwrap().unwrap();
        assert_eq!(stored.value, "970");
        assert_eq!(store.recent_transactions(10).await.unwrap().len(), 3);
        // One journal append and one balance write.
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_writes_are_retried() {
        let store = MemoryStore::new();
        store.fail_next_writes(3);
        let (sender, inbox) = mpsc::unbounded_channel();
        tokio::spawn(PersistenceWorker::new(Arc::new(store.clone()), inbox, config()).run());

        sender.send(record(1234)).unwrap();
        flush(&sender).await;

        let stored = store.load(StateKey::Balance).await.unwrap().unwrap();
        assert_eq!(stored.value, "1234");
        assert_eq!(store.recent_transactions(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        store.fail_next_writes(100);
        let (sender, inbox) = mpsc::unbounded_channel();
        let config = PersistenceConfig {
            max_attempts: Some(2),
            ..config()
        };
        tokio::spawn(PersistenceWorker::new(Arc::new(store.clone()), inbox, config).run());

        sender.send(record(1)).unwrap();
        flush(&sender).await;

        assert!(store.load(StateKey::Balance).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settings_are_written_and_removed() {
        let store = MemoryStore::new();
        let (sender, inbox) = mpsc::unbounded_channel();
        tokio::spawn(PersistenceWorker::new(Arc::new(store.clone()), inbox, config()).run());

        sender
            .send(PersistCommand::Setting {
                key: StateKey::LastActiveGame,
                value: Some(StoredValue::new("roulette", Utc::now())),
            })
            .unwrap();
        flush(&sender).await;
        assert_eq!(
            store
                .load(StateKey::LastActiveGame)
                .await
                .unwrap()
                .map(|v| v.value),
            Some("roulette".to_string())
        );

        sender
            .send(PersistCommand::Setting {
                key: StateKey::LastActiveGame,
                value: None,
            })
            .unwrap();
        flush(&sender).await;
        assert!(store.load(StateKey::LastActiveGame).await.unwrap().is_none());
    }
}
