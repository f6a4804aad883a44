// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends for durable persistence.
//!
//! Two variants, behind the [`traits::StorageBackend`] contract:
//! - [`quota::QuotaStore`]: immediate in-memory store bounded by a byte
//!   quota (a shared namespace keyed by store name, like browser-local
//!   storage).
//! - [`embedded::EmbeddedStore`]: SQLite-backed store with an explicit
//!   open lifecycle and one database file per store name. Operations
//!   invoked before open transparently await initialization.

pub mod embedded;
pub mod quota;
pub mod traits;
