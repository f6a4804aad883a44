// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Echo Store
//!
//! A reactive state store with durable persistence and cross-context
//! synchronization.
//!
//! ## Architecture
//!
//! Every store runs the same commit pipeline:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Store Facade                          │
//! │  • replace / update / merge / remove / reset               │
//! │  • Synchronous reads via current() and watch()             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      State Container                        │
//! │  • Commit applied synchronously, reads never suspend       │
//! │  • Listeners notified with (new, old) once per commit      │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!     (debounced write)               (debounced broadcast)
//!                ▼                              ▼
//! ┌───────────────────────────┐  ┌───────────────────────────────┐
//! │  Persistence Middleware   │  │        Sync Channel           │
//! │  • Content-hash skip      │  │  • Hash-based loop breaking   │
//! │  • Bounded retry          │  │  • Remote commits re-persist  │
//! │  • Quota / SQLite backend │  │    but never re-broadcast     │
//! └───────────────────────────┘  └───────────────────────────────┘
//! ```
//!
//! On construction a persistent store hydrates in the background: it loads
//! its record, or seeds one from the current value, or degrades to
//! memory-only if the backend is down. Reads work immediately either way.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use echo_store::{StorageKind, Store, StoreOptions};
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Settings {
//!     theme: String,
//!     font_size: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), echo_store::StoreError> {
//!     // Named, persisted, synchronized across contexts sharing the hub
//!     let settings = Store::new(
//!         Settings::default(),
//!         StoreOptions::named("settings")
//!             .storage(StorageKind::Embedded)
//!             .sync(true),
//!     )?;
//!     settings.wait_hydrated().await;
//!
//!     let _guard = settings.subscribe(|new: &Settings, old: &Settings| {
//!         println!("theme: {} -> {}", old.theme, new.theme);
//!     });
//!
//!     settings.merge(json!({"theme": "dark"}))?;
//!     settings.flush().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Synchronous reads**: `current()` and `watch()` never touch storage
//! - **Debounced persistence**: bursts of commits coalesce into one write
//! - **Content-hash deduplication**: unchanged values are never re-written
//!   or re-broadcast, and broadcast loops break on the hash
//! - **Bounded retry**: transient storage failures retried a fixed number
//!   of times, then dropped with a log line
//! - **Two backends**: a quota-bounded in-memory map and an embedded
//!   SQLite database, behind one [`StorageBackend`] trait
//! - **Graceful degradation**: storage or hub failures never take down the
//!   in-memory store
//!
//! ## Modules
//!
//! - [`store`]: The [`Store`] facade tying everything together
//! - [`state`]: Synchronous state container and subscriptions
//! - [`storage`]: Storage backends and the [`StorageBackend`] trait
//! - [`sync`]: Broadcast hub and cross-context sync channel
//! - [`resilience`]: Retry policies
//! - [`config`]: [`StoreOptions`] and [`StoreConfig`]

pub mod config;
pub mod debounce;
pub mod error;
pub(crate) mod hydration;
pub mod metrics;
pub(crate) mod persist;
pub mod record;
pub mod resilience;
pub mod state;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::{ChangeListener, RehydrateListener, StorageKind, StoreConfig, StoreOptions};
pub use debounce::Debouncer;
pub use error::StoreError;
pub use record::{content_hash, BroadcastEnvelope, PersistedRecord, ENVELOPE_TYPE};
pub use resilience::retry::RetryConfig;
pub use state::{CommitOrigin, Subscription};
pub use storage::embedded::EmbeddedStore;
pub use storage::quota::QuotaStore;
pub use storage::traits::{StorageBackend, StorageError};
pub use store::Store;
pub use sync::hub::BroadcastHub;
