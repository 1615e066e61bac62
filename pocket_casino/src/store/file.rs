//! JSON file store.
//!
//! State lives in a single JSON document that is rewritten atomically (write to
//! a sibling temp file, then rename over the original). Transactions go to a
//! JSON-lines journal next to it (`<state file>.journal`). The journal keeps
//! at most twice its limit; past that it is rewritten with the newest entries.

use super::{StateKey, StateStore, StoreError, StoreResult, StoredValue};
use crate::ledger::Transaction;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

type StateDocument = BTreeMap<String, StoredValue>;

/// Journal entries kept when no limit is given
pub const DEFAULT_JOURNAL_LIMIT: usize = 500;

/// Ids of the entries currently in the journal file
#[derive(Debug, Default)]
struct JournalIndex {
    ids: HashSet<Uuid>,
    lines: usize,
}

impl JournalIndex {
    fn from_transactions(transactions: &[Transaction]) -> Self {
        Self {
            ids: transactions.iter().map(|tx| tx.id).collect(),
            lines: transactions.len(),
        }
    }
}

/// File-backed store
pub struct FileStore {
    path: PathBuf,
    journal_path: PathBuf,
    journal_limit: usize,
    /// Serializes writers; holds the journal index once it has been read
    journal: Mutex<Option<JournalIndex>>,
}

impl FileStore {
    /// Create a store rooted at `path`; nothing is touched until the first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_journal_limit(path, DEFAULT_JOURNAL_LIMIT)
    }

    /// Like [`FileStore::new`], keeping at least `limit` journal entries
    pub fn with_journal_limit(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let mut journal = path.clone().into_os_string();
        journal.push(".journal");

        Self {
            path,
            journal_path: PathBuf::from(journal),
            journal_limit: limit.max(1),
            journal: Mutex::new(None),
        }
    }

    pub fn journal_limit(&self) -> usize {
        self.journal_limit
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    async fn read_document(&self) -> StoreResult<StateDocument> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StateDocument::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupted {
                key: self.path.display().to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StateDocument::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &StateDocument) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        replace_file(&self.path, bytes).await
    }

    /// Read-modify-write of the state document under the writer lock
    async fn update_document<F>(&self, update: F) -> StoreResult<()>
    where
        F: FnOnce(&mut StateDocument) + Send,
    {
        let _guard = self.journal.lock().await;

        // A damaged document is replaced rather than blocking every later write.
        let mut document = match self.read_document().await {
            Ok(document) => document,
            Err(e) if e.is_corruption() => {
                log::warn!("Replacing unreadable state file {}: {}", self.path.display(), e);
                StateDocument::new()
            }
            Err(e) => return Err(e),
        };

        update(&mut document);
        self.write_document(&document).await
    }

    /// The newest `limit` readable journal entries, oldest first
    async fn read_journal(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let contents = match fs::read_to_string(&self.journal_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let capacity = limit.min(self.journal_limit.saturating_mul(2));
        let mut transactions = VecDeque::with_capacity(capacity);
        for (number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(transaction) => {
                    if transactions.len() == limit {
                        transactions.pop_front();
                    }
                    transactions.push_back(transaction);
                }
                Err(e) => log::warn!(
                    "Skipping unreadable journal line {} in {}: {}",
                    number + 1,
                    self.journal_path.display(),
                    e
                ),
            }
        }
        Ok(transactions.into())
    }

    /// Rewrite the journal with only its newest `journal_limit` entries
    async fn compact_journal(&self) -> StoreResult<JournalIndex> {
        let kept = self.read_journal(self.journal_limit).await?;

        let mut lines = String::new();
        for transaction in &kept {
            lines.push_str(&serde_json::to_string(transaction)?);
            lines.push('\n');
        }
        replace_file(&self.journal_path, lines.into_bytes()).await?;

        log::debug!(
            "Compacted {} to {} entries",
            self.journal_path.display(),
            kept.len()
        );
        Ok(JournalIndex::from_transactions(&kept))
    }
}

/// Write to a sibling temp file, then rename it over `path`
async fn replace_file(path: &Path, bytes: Vec<u8>) -> StoreResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self, key: StateKey) -> StoreResult<Option<StoredValue>> {
        let document = self.read_document().await?;
        Ok(document.get(key.as_str()).cloned())
    }

    async fn save(&self, key: StateKey, value: StoredValue) -> StoreResult<()> {
        self.update_document(|document| {
            document.insert(key.as_str().to_string(), value);
        })
        .await
    }

    async fn remove(&self, key: StateKey) -> StoreResult<()> {
        self.update_document(|document| {
            document.remove(key.as_str());
        })
        .await
    }

    async fn append_transactions(&self, transactions: &[Transaction]) -> StoreResult<()> {
        let mut known = self.journal.lock().await;

        if known.is_none() {
            let on_disk = self.read_journal(usize::MAX).await?;
            *known = Some(JournalIndex::from_transactions(&on_disk));
        }
        let Some(index) = known.as_mut() else {
            return Ok(());
        };

        let mut lines = String::new();
        let mut fresh = Vec::new();
        for transaction in transactions {
            if index.ids.contains(&transaction.id) || fresh.contains(&transaction.id) {
                continue;
            }
            lines.push_str(&serde_json::to_string(transaction)?);
            lines.push('\n');
            fresh.push(transaction.id);
        }

        if lines.is_empty() {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await?;
        file.write_all(lines.as_bytes()).await?;
        file.flush().await?;

        index.lines += fresh.len();
        index.ids.extend(fresh);

        if index.lines > self.journal_limit.saturating_mul(2) {
            *index = self.compact_journal().await?;
        }
        Ok(())
    }

    async fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        self.read_journal(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionCause;
    use chrono::Utc;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("pocket_casino_{}.json", Uuid::new_v4()))
    }

    async fn cleanup(store: &FileStore) {
        let _ = fs::remove_file(store.path()).await;
        let _ = fs::remove_file(store.journal_path()).await;
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let store = FileStore::new(temp_path());
        assert!(store.load(StateKey::Balance).await.unwrap().is_none());
        assert!(store.recent_transactions(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let path = temp_path();
        let store = FileStore::new(&path);
        let value = StoredValue::new(740, Utc::now());
        store.save(StateKey::Balance, value.clone()).await.unwrap();
        store
            .save(StateKey::DefaultWager, StoredValue::new(25, Utc::now()))
            .await
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.load(StateKey::Balance).await.unwrap(), Some(value));
        assert_eq!(
            reopened
                .load(StateKey::DefaultWager)
                .await
                .unwrap()
                .map(|v| v.value),
            Some("25".to_string())
        );

        cleanup(&store).await;
    }

    #[tokio::test]
    async fn test_corrupted_document_is_reported_then_replaced() {
        let path = temp_path();
        fs::write(&path, b"{ not json").await.unwrap();
        let store = FileStore::new(&path);

        let err = store.load(StateKey::Balance).await.unwrap_err();
        assert!(err.is_corruption());

        store
            .save(StateKey::Balance, StoredValue::new(1000, Utc::now()))
            .await
            .unwrap();
        assert!(store.load(StateKey::Balance).await.unwrap().is_some());

        cleanup(&store).await;
    }

    #[tokio::test]
    async fn test_journal_appends_once_per_id() {
        let path = temp_path();
        let store = FileStore::new(&path);
        let first = Transaction::new(-10, 990, TransactionCause::Wager, None, Utc::now());
        let second = Transaction::new(
            30,
            1020,
            TransactionCause::Payout,
            Some("classic".to_string()),
            Utc::now(),
        );

        store.append_transactions(&[first.clone()]).await.unwrap();
        store
            .append_transactions(&[first.clone(), second.clone()])
            .await
            .unwrap();

        // A fresh handle must also see the ids already on disk.
        let reopened = FileStore::new(&path);
        reopened.append_transactions(&[second.clone()]).await.unwrap();

        assert_eq!(
            reopened.recent_transactions(10).await.unwrap(),
            vec![first, second.clone()]
        );
        assert_eq!(reopened.recent_transactions(1).await.unwrap(), vec![second]);

        cleanup(&store).await;
    }

    #[tokio::test]
    async fn test_journal_is_compacted_to_its_limit() {
        let path = temp_path();
        let store = FileStore::with_journal_limit(&path, 3);
        let transactions: Vec<_> = (0..7i64)
            .map(|n| {
                let balance = 100 - n as u64;
                Transaction::new(-1, balance, TransactionCause::Wager, None, Utc::now())
            })
            .collect();

        for transaction in &transactions[..6] {
            store.append_transactions(&[transaction.clone()]).await.unwrap();
        }
        let contents = fs::read_to_string(store.journal_path()).await.unwrap();
        assert_eq!(contents.lines().count(), 6);

        // The seventh line crosses twice the limit and leaves the newest three.
        store.append_transactions(&transactions[6..]).await.unwrap();
        let contents = fs::read_to_string(store.journal_path()).await.unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert_eq!(
            store.recent_transactions(10).await.unwrap(),
            transactions[4..].to_vec()
        );

        // Ids still in the journal are not written again.
        store.append_transactions(&transactions[5..]).await.unwrap();
        assert_eq!(store.recent_transactions(10).await.unwrap().len(), 3);

        cleanup(&store).await;
    }
}
