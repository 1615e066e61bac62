//! PostgreSQL store.
#![allow(clippy::needless_raw_string_hashes)]

use super::{StateKey, StateStore, StoreError, StoreResult, StoredValue};
use crate::ledger::{Transaction, TransactionCause};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;
use uuid::Uuid;

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    /// Create a store over an existing pool
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create the state and journal tables if they do not exist yet
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS casino_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                written_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS casino_transactions (
                id UUID PRIMARY KEY,
                delta BIGINT NOT NULL,
                balance_after BIGINT NOT NULL,
                cause TEXT NOT NULL,
                game TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                seq BIGSERIAL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
        let id: Uuid = row.get("id");
        let balance_after: i64 = row.get("balance_after");
        let cause: String = row.get("cause");

        let balance_after = u64::try_from(balance_after).map_err(|_| StoreError::Corrupted {
            key: format!("transaction {id}"),
            reason: format!("negative balance {balance_after}"),
        })?;
        let cause = cause
            .parse::<TransactionCause>()
            .map_err(|reason| StoreError::Corrupted {
                key: format!("transaction {id}"),
                reason,
            })?;

        Ok(Transaction {
            id,
            delta: row.get("delta"),
            balance_after,
            cause,
            game: row.get("game"),
            timestamp: row.get::<DateTime<Utc>, _>("created_at"),
        })
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn load(&self, key: StateKey) -> StoreResult<Option<StoredValue>> {
        let row = sqlx::query(
            r#"
            SELECT value, written_at
            FROM casino_state
            WHERE key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|row| StoredValue {
            value: row.get("value"),
            written_at: row.get::<DateTime<Utc>, _>("written_at"),
        }))
    }

    async fn save(&self, key: StateKey, value: StoredValue) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO casino_state (key, value, written_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, written_at = EXCLUDED.written_at
            "#,
        )
        .bind(key.as_str())
        .bind(&value.value)
        .bind(value.written_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn remove(&self, key: StateKey) -> StoreResult<()> {
        sqlx::query("DELETE FROM casino_state WHERE key = $1")
            .bind(key.as_str())
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn append_transactions(&self, transactions: &[Transaction]) -> StoreResult<()> {
        if transactions.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for transaction in transactions {
            let balance_after =
                i64::try_from(transaction.balance_after).map_err(|_| StoreError::Corrupted {
                    key: format!("transaction {}", transaction.id),
                    reason: "balance exceeds BIGINT".to_string(),
                })?;

            sqlx::query(
                r#"
                INSERT INTO casino_transactions (id, delta, balance_after, cause, game, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(transaction.id)
            .bind(transaction.delta)
            .bind(balance_after)
            .bind(transaction.cause.to_string())
            .bind(transaction.game.as_deref())
            .bind(transaction.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, delta, balance_after, cause, game, created_at
            FROM casino_transactions
            ORDER BY seq DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut transactions = rows
            .iter()
            .map(Self::transaction_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        transactions.reverse();
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DatabaseConfig};

    async fn connect() -> PgStore {
        let mut config = DatabaseConfig::from_env();
        config.max_connections = 2;
        let db = Database::new(&config)
            .await
            .expect("Failed to connect to database");
        let store = PgStore::new(Arc::new(db.pool().clone()));
        store.ensure_schema().await.expect("Failed to create schema");
        store
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_pg_state_roundtrip() {
        let store = connect().await;
        let value = StoredValue::new(4321, Utc::now());

        store.save(StateKey::Balance, value.clone()).await.unwrap();
        let loaded = store.load(StateKey::Balance).await.unwrap().unwrap();
        assert_eq!(loaded.value, "4321");
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_pg_journal_is_idempotent() {
        let store = connect().await;
        let tx = Transaction::new(-10, 990, TransactionCause::Wager, None, Utc::now());

        store.append_transactions(&[tx.clone()]).await.unwrap();
        store.append_transactions(&[tx.clone()]).await.unwrap();

        let recent = store.recent_transactions(50).await.unwrap();
        assert_eq!(recent.iter().filter(|t| t.id == tx.id).count(), 1);
    }
}
