//! In-process store, used by tests and throwaway sessions.

use super::{StateKey, StateStore, StoreError, StoreResult, StoredValue};
use crate::ledger::Transaction;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryInner {
    values: HashMap<StateKey, StoredValue>,
    journal: Vec<Transaction>,
    journal_ids: HashSet<Uuid>,
}

/// In-memory store with write-failure injection
///
/// Clones share the same underlying data, so a test can keep one handle to
/// inspect what the ledger wrote through another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
    failures: Arc<AtomicU32>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with `StoreError::Unavailable`
    pub fn fail_next_writes(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes (saves, removals and journal appends)
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store a raw value, bypassing failure injection
    ///
    /// Simulates another writer (or a damaged record) touching the store.
    pub async fn put_raw(&self, key: StateKey, value: StoredValue) {
        self.inner.lock().await.values.insert(key, value);
    }

    fn check_injected_failure(&self) -> StoreResult<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if injected {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, key: StateKey) -> StoreResult<Option<StoredValue>> {
        Ok(self.inner.lock().await.values.get(&key).cloned())
    }

    async fn save(&self, key: StateKey, value: StoredValue) -> StoreResult<()> {
        self.check_injected_failure()?;
        self.inner.lock().await.values.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: StateKey) -> StoreResult<()> {
        self.check_injected_failure()?;
        self.inner.lock().await.values.remove(&key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn append_transactions(&self, transactions: &[Transaction]) -> StoreResult<()> {
        self.check_injected_failure()?;
        let mut inner = self.inner.lock().await;
        for transaction in transactions {
            if inner.journal_ids.insert(transaction.id) {
                inner.journal.push(transaction.clone());
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        let skip = inner.journal.len().saturating_sub(limit);
        Ok(inner.journal[skip..].to_vec())
    }
}
