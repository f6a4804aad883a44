// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::PersistedRecord;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend quota exhausted. Recoverable: the write is rejected, the
    /// in-memory value is unaffected.
    #[error("Storage quota exceeded: {requested} bytes requested, {used}/{quota} in use")]
    QuotaExceeded {
        used: usize,
        requested: usize,
        quota: usize,
    },
    /// Connection or initialization failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
    /// Record could not be serialized for storage.
    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

/// Uniform key-value persistence contract shared by both backend variants.
///
/// Reads and writes are atomic per key from the caller's perspective: a
/// `get` observes either a complete previously written record or nothing.
/// Concurrent writers to the same key resolve last-write-wins.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StorageError>;
    async fn set(&self, record: &PersistedRecord) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
