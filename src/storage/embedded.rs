// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Embedded SQLite backend.
//!
//! The asynchronous, larger-capacity variant: each store name gets its own
//! database file under the configured data directory, holding a single
//! `records` table.
//!
//! The backend is a two-state resource (Closed -> Open). [`EmbeddedStore::open`]
//! initializes the connection pool and schema explicitly; any operation
//! invoked before that transparently awaits the same initialization, so
//! callers never observe a "not open yet" error.
//!
//! ```sql
//! CREATE TABLE records (
//!   key        TEXT PRIMARY KEY,
//!   value      TEXT NOT NULL,     -- canonical JSON
//!   updated_at INTEGER NOT NULL   -- epoch millis, last-write-wins audit
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::Row;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::traits::{StorageBackend, StorageError};
use crate::record::{epoch_millis, PersistedRecord};
use crate::resilience::retry::{retry, RetryConfig};

pub struct EmbeddedStore {
    db_path: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl EmbeddedStore {
    /// Backend for one store name: database file `{data_dir}/{name}.db`.
    ///
    /// No I/O happens here; the pool opens lazily on first use or via
    /// [`open`](Self::open).
    #[must_use]
    pub fn for_name(data_dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            db_path: data_dir.as_ref().join(format!("{name}.db")),
            pool: OnceCell::new(),
        }
    }

    /// Explicitly initialize the connection pool and schema.
    ///
    /// Idempotent; concurrent callers share one initialization.
    #[tracing::instrument(skip(self), fields(path = %self.db_path.display()))]
    pub async fn open(&self) -> Result<(), StorageError> {
        self.pool().await.map(|_| ())
    }

    /// Whether initialization has completed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.pool.initialized()
    }

    async fn pool(&self) -> Result<&SqlitePool, StorageError> {
        self.pool
            .get_or_try_init(|| async {
                if let Some(dir) = self.db_path.parent() {
                    std::fs::create_dir_all(dir)
                        .map_err(|e| StorageError::Backend(format!("create data dir: {e}")))?;
                }

                // WAL mode: concurrent reads during writes, single fsync
                let options = SqliteConnectOptions::new()
                    .filename(&self.db_path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal);

                let pool = retry("embedded_open", &RetryConfig::open(), || async {
                    SqlitePoolOptions::new()
                        .max_connections(4)
                        .acquire_timeout(Duration::from_secs(10))
                        .connect_with(options.clone())
                        .await
                        .map_err(|e| StorageError::Backend(e.to_string()))
                })
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS records (
                        key        TEXT PRIMARY KEY,
                        value      TEXT NOT NULL,
                        updated_at INTEGER NOT NULL
                    )
                    "#,
                )
                .execute(&pool)
                .await
                .map_err(|e| StorageError::Backend(format!("init schema: {e}")))?;

                info!(path = %self.db_path.display(), "Embedded store opened");
                Ok(pool)
            })
            .await
    }
}

#[async_trait]
impl StorageBackend for EmbeddedStore {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StorageError> {
        let pool = self.pool().await?;

        let row = sqlx::query("SELECT value FROM records WHERE key = ?1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("value")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let value = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(PersistedRecord::new(key, value)))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let pool = self.pool().await?;

        let raw = serde_json::to_string(&record.value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO records (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.key)
        .bind(&raw)
        .bind(epoch_millis())
        .execute(pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(key = %record.key, bytes = raw.len(), "Record persisted");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let pool = self.pool().await?;

        sqlx::query("DELETE FROM records WHERE key = ?1")
            .bind(key)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }
}
