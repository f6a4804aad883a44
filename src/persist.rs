// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistence middleware.
//!
//! Observes every state commit and keeps the backing record up to date:
//! - commits whose content hash equals the last persisted hash are skipped
//! - commits originating from hydration are skipped (they came *from* the
//!   backing record; writing them back would loop)
//! - everything else schedules a debounced write; bursts coalesce into one
//!   write carrying the latest value
//!
//! Writes are retried a bounded number of times with a fixed delay, then
//! logged and dropped. Persistence failure never blocks or fails the
//! in-memory mutation that triggered it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};

use crate::debounce::Debouncer;
use crate::record::PersistedRecord;
use crate::resilience::retry::{retry, RetryConfig};
use crate::state::CommitOrigin;
use crate::storage::traits::StorageBackend;

pub(crate) struct PersistenceMiddleware {
    key: String,
    backend: Arc<dyn StorageBackend>,
    debouncer: Debouncer,
    retry: RetryConfig,
    last_persisted: Mutex<Option<String>>,
}

impl PersistenceMiddleware {
    pub fn new(
        key: String,
        backend: Arc<dyn StorageBackend>,
        debounce: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            key,
            backend,
            debouncer: Debouncer::new(debounce),
            retry,
            last_persisted: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Mark `hash` as already durable without writing (hydration load, seed).
    pub fn note_persisted(&self, hash: &str) {
        *self.last_persisted.lock() = Some(hash.to_string());
    }

    /// React to a committed value. `value` is the canonical JSON form,
    /// `hash` its content hash. Synchronous; never blocks the caller.
    pub fn on_commit(self: &Arc<Self>, value: Value, hash: String, origin: CommitOrigin) {
        if origin == CommitOrigin::Hydration {
            crate::metrics::record_persist(&self.key, "skipped");
            return;
        }

        if self.last_persisted.lock().as_deref() == Some(hash.as_str()) {
            debug!(key = %self.key, "Commit content unchanged since last write, skipping");
            crate::metrics::record_persist(&self.key, "skipped");
            return;
        }

        let this = self.clone();
        self.debouncer.schedule(async move {
            this.write_now(value, hash).await;
        });
    }

    /// Best-effort immediate write of the given value, bypassing the
    /// debounce (teardown flush, seed record).
    pub async fn flush(&self, value: Value, hash: String) {
        self.debouncer.cancel();
        if self.last_persisted.lock().as_deref() == Some(hash.as_str()) {
            return;
        }
        self.write_now(value, hash).await;
    }

    async fn write_now(&self, value: Value, hash: String) {
        let start = std::time::Instant::now();
        let record = PersistedRecord::new(&self.key, value);

        let result = retry("persist_write", &self.retry, || {
            let record = &record;
            async move { self.backend.set(record).await }
        })
        .await;

        match result {
            Ok(()) => {
                *self.last_persisted.lock() = Some(hash);
                debug!(key = %self.key, "Persisted store value");
                crate::metrics::record_persist(&self.key, "success");
            }
            Err(e) => {
                // Give up: the next commit will try again with fresher content
                error!(key = %self.key, error = %e, "Persistence write failed after retries");
                crate::metrics::record_persist(&self.key, "error");
            }
        }
        crate::metrics::record_persist_latency(&self.key, start.elapsed());
    }

    /// Delete the backing record and forget the persisted hash (wipe).
    pub async fn delete_record(&self) -> Result<(), crate::storage::traits::StorageError> {
        self.debouncer.cancel();
        *self.last_persisted.lock() = None;
        self.backend.delete(&self.key).await
    }
}
