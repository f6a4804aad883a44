// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store configuration and construction options.
//!
//! # Example
//!
//! ```
//! use echo_store::StoreConfig;
//!
//! // Minimal config (uses defaults)
//! let config = StoreConfig::default();
//! assert_eq!(config.debounce_ms, 300);
//! assert_eq!(config.broadcast_debounce_ms, 100);
//!
//! // Full config
//! let config = StoreConfig {
//!     debounce_ms: 50,
//!     broadcast_debounce_ms: 20,
//!     persist_retry_attempts: 5,
//!     ..Default::default()
//! };
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::resilience::retry::RetryConfig;
use crate::storage::traits::StorageBackend;
use crate::sync::hub::BroadcastHub;

/// Tunables for a store instance.
///
/// All fields have sensible defaults; host applications typically only
/// override `data_dir` for the embedded backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Quiet interval before a debounced persistence write (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Quiet interval before a debounced broadcast (milliseconds)
    #[serde(default = "default_broadcast_debounce_ms")]
    pub broadcast_debounce_ms: u64,

    /// Total persistence write attempts before giving up
    #[serde(default = "default_persist_retry_attempts")]
    pub persist_retry_attempts: usize,

    /// Fixed delay between persistence write attempts (milliseconds)
    #[serde(default = "default_persist_retry_delay_ms")]
    pub persist_retry_delay_ms: u64,

    /// Directory for embedded backend database files (one per store name)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_debounce_ms() -> u64 { 300 }
fn default_broadcast_debounce_ms() -> u64 { 100 }
fn default_persist_retry_attempts() -> usize { 3 }
fn default_persist_retry_delay_ms() -> u64 { 250 }
fn default_data_dir() -> PathBuf { PathBuf::from("./echo-store") }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            broadcast_debounce_ms: default_broadcast_debounce_ms(),
            persist_retry_attempts: default_persist_retry_attempts(),
            persist_retry_delay_ms: default_persist_retry_delay_ms(),
            data_dir: default_data_dir(),
        }
    }
}

impl StoreConfig {
    /// Retry policy for persistence writes: bounded attempts, fixed delay.
    #[must_use]
    pub fn persist_retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: Some(self.persist_retry_attempts),
            initial_delay: Duration::from_millis(self.persist_retry_delay_ms),
            max_delay: Duration::from_millis(self.persist_retry_delay_ms),
            factor: 1.0,
        }
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn broadcast_debounce(&self) -> Duration {
        Duration::from_millis(self.broadcast_debounce_ms)
    }
}

/// Which storage backend a store persists to.
#[derive(Clone, Default)]
pub enum StorageKind {
    /// No persistence. The store is purely in-memory.
    #[default]
    None,
    /// Quota-bounded in-memory backend (shared namespace keyed by name).
    Quota,
    /// Embedded SQLite backend (one database file per store name).
    Embedded,
    /// Caller-provided backend (dependency injection, test doubles).
    Custom(Arc<dyn StorageBackend>),
}

impl fmt::Debug for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Quota => write!(f, "Quota"),
            Self::Embedded => write!(f, "Embedded"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl StorageKind {
    /// Whether this kind persists at all.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Change listener: invoked with `(new, old)` after each commit.
pub type ChangeListener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// Rehydration listener: invoked once when hydration completes, with the
/// loaded value, or `None` when no prior record existed.
pub type RehydrateListener<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

/// Construction options for a [`crate::Store`] (the store descriptor).
///
/// Invariant: `sync = true` requires `name`; persistent storage kinds also
/// require `name`. Violations are construction errors.
pub struct StoreOptions<T> {
    /// Persistence key and sync channel identity.
    pub name: Option<String>,
    /// Backend variant.
    pub storage: StorageKind,
    /// Start with cross-context sync enabled.
    pub sync: bool,
    /// Change callback, invoked synchronously with `(new, old)`.
    pub on_change: Option<ChangeListener<T>>,
    /// Hydration-complete callback.
    pub on_rehydrate: Option<RehydrateListener<T>>,
    /// Broadcast capability. `None` degrades sync to local-only.
    pub hub: Option<Arc<BroadcastHub>>,
    /// Tunables.
    pub config: StoreConfig,
}

impl<T> Default for StoreOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            storage: StorageKind::None,
            sync: false,
            on_change: None,
            on_rehydrate: None,
            hub: Some(BroadcastHub::global()),
            config: StoreConfig::default(),
        }
    }
}

impl<T> StoreOptions<T> {
    /// Options for a named store.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn sync(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    #[must_use]
    pub fn on_change(mut self, listener: impl Fn(&T, &T) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(listener));
        self
    }

    #[must_use]
    pub fn on_rehydrate(mut self, listener: impl Fn(Option<&T>) + Send + Sync + 'static) -> Self {
        self.on_rehydrate = Some(Arc::new(listener));
        self
    }

    /// Use a specific broadcast hub (simulated contexts in tests), or `None`
    /// for an environment without a broadcast primitive.
    #[must_use]
    pub fn hub(mut self, hub: Option<Arc<BroadcastHub>>) -> Self {
        self.hub = hub;
        self
    }

    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }
}

impl<T> fmt::Debug for StoreOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("sync", &self.sync)
            .field("on_change", &self.on_change.is_some())
            .field("on_rehydrate", &self.on_rehydrate.is_some())
            .field("hub", &self.hub.is_some())
            .field("config", &self.config)
            .finish()
    }
}
