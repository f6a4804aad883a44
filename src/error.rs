// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Top-level error type for the store facade.
//!
//! Only configuration problems are reported loudly, at construction time.
//! Storage and broadcast failures are contained inside the middleware and
//! logged via `tracing` - they never propagate into the synchronous hot path
//! (`current`, `replace`, `update`, `reset`, `subscribe`).

use thiserror::Error;

use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid store configuration (e.g. sync enabled without a name).
    /// Raised at construction time, never later.
    #[error("Store configuration error: {0}")]
    Config(String),

    /// Storage backend failure, surfaced only from explicit async calls
    /// such as [`crate::Store::wipe`] and [`crate::Store::flush`].
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A merge patch or field removal produced a value that no longer
    /// deserializes to `T`. The in-memory value is left untouched.
    #[error("Value serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Merge/remove was applied to a value that is not a JSON object.
    #[error("Value is not a JSON object: {0}")]
    NotAnObject(String),
}
