// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Quota-bounded in-memory backend.
//!
//! Models a synchronous-style storage medium with limited capacity (tens of
//! megabytes): operations complete immediately, but writes that would push
//! the namespace over its byte quota are rejected with a recoverable error.
//! All stores sharing a [`QuotaStore`] share one namespace keyed by store
//! name; [`QuotaStore::global`] is the process-wide default.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use super::traits::{StorageBackend, StorageError};
use crate::record::PersistedRecord;

static GLOBAL: Lazy<Arc<QuotaStore>> = Lazy::new(|| Arc::new(QuotaStore::new(10 * 1024 * 1024)));

pub struct QuotaStore {
    records: DashMap<String, String>,
    used_bytes: AtomicUsize,
    quota_bytes: usize,
}

impl QuotaStore {
    #[must_use]
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            records: DashMap::new(),
            used_bytes: AtomicUsize::new(0),
            quota_bytes,
        }
    }

    /// The shared process-wide namespace (10 MB quota).
    #[must_use]
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Bytes currently stored across all keys.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clear all records (test helper for the shared namespace).
    pub fn clear(&self) {
        self.records.clear();
        self.used_bytes.store(0, Ordering::Release);
    }

    fn entry_size(key: &str, raw: &str) -> usize {
        key.len() + raw.len()
    }
}

#[async_trait]
impl StorageBackend for QuotaStore {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StorageError> {
        match self.records.get(key) {
            Some(raw) => {
                let value = serde_json::from_str(raw.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(PersistedRecord::new(key, value)))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&record.value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let new_size = Self::entry_size(&record.key, &raw);
        let old_size = self
            .records
            .get(&record.key)
            .map_or(0, |existing| Self::entry_size(&record.key, existing.value()));

        let used = self.used_bytes.load(Ordering::Acquire);
        let projected = used.saturating_sub(old_size).saturating_add(new_size);
        if projected > self.quota_bytes {
            debug!(
                key = %record.key,
                used,
                requested = new_size,
                quota = self.quota_bytes,
                "Quota-bounded write rejected"
            );
            return Err(StorageError::QuotaExceeded {
                used,
                requested: new_size,
                quota: self.quota_bytes,
            });
        }

        self.records.insert(record.key.clone(), raw);
        self.used_bytes.store(projected, Ordering::Release);
        crate::metrics::set_quota_used_bytes(projected);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if let Some((_, raw)) = self.records.remove(key) {
            self.used_bytes
                .fetch_sub(Self::entry_size(key, &raw), Ordering::Release);
            crate::metrics::set_quota_used_bytes(self.used_bytes());
        }
        Ok(())
    }
}
