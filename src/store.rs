// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The store facade.
//!
//! [`Store`] wires the state cell, persistence middleware, sync channel and
//! hydration together behind one handle. Every mutation runs the same
//! pipeline: commit synchronously, hand the canonical JSON form to
//! persistence and sync, then notify listeners with `(new, old)`.
//!
//! ```no_run
//! use echo_store::{Store, StoreOptions, StorageKind};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Settings {
//!     theme: String,
//!     font_size: u32,
//! }
//!
//! # async fn demo() -> Result<(), echo_store::StoreError> {
//! let settings = Store::new(
//!     Settings::default(),
//!     StoreOptions::named("settings")
//!         .storage(StorageKind::Quota)
//!         .sync(true),
//! )?;
//!
//! settings.update(|s| Settings { font_size: s.font_size + 1, ..s.clone() });
//! let _guard = settings.subscribe(|new, _old| println!("theme is now {}", new.theme));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::{StorageKind, StoreOptions};
use crate::error::StoreError;
use crate::hydration;
use crate::persist::PersistenceMiddleware;
use crate::record::{content_hash, BroadcastEnvelope};
use crate::state::{CommitOrigin, StateCell, Subscription};
use crate::storage::embedded::EmbeddedStore;
use crate::storage::quota::QuotaStore;
use crate::storage::traits::StorageBackend;
use crate::sync::SyncChannel;

pub(crate) struct StoreInner<T> {
    /// Store name; `None` for anonymous in-memory stores.
    pub(crate) name: Option<String>,
    /// Label for logs and metrics (`"anonymous"` when unnamed).
    pub(crate) metric_name: String,
    pub(crate) state: StateCell<T>,
    pub(crate) persist: Option<Arc<PersistenceMiddleware>>,
    pub(crate) sync: Option<SyncChannel>,
    hydrated_tx: watch::Sender<bool>,
}

impl<T> StoreInner<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// The one commit pipeline. Commit first (reads see the new value
    /// immediately), then schedule persistence and broadcast from the
    /// canonical JSON form, then notify listeners.
    pub(crate) fn commit_value(&self, new: T, origin: CommitOrigin) {
        let old = self.state.commit(new.clone(), origin);
        crate::metrics::record_commit(&self.metric_name, origin.as_str());

        match serde_json::to_value(&new) {
            Ok(value) => {
                let hash = content_hash(&value.to_string());
                if let Some(persist) = &self.persist {
                    persist.on_commit(value.clone(), hash.clone(), origin);
                }
                if let Some(sync) = &self.sync {
                    sync.on_commit(value, hash, origin);
                }
            }
            Err(error) => {
                // The in-memory commit stands; it just cannot leave this context
                warn!(store = %self.metric_name, %error, "Value is not serializable, skipping persistence and broadcast");
            }
        }

        self.state.notify(&new, &old);
    }

    /// Apply an inbound broadcast envelope as a `Remote` commit.
    pub(crate) async fn apply_remote(&self, envelope: BroadcastEnvelope) {
        let Some(sync) = &self.sync else { return };

        let value: T = match serde_json::from_value(envelope.state) {
            Ok(value) => value,
            Err(error) => {
                debug!(store = %self.metric_name, %error, "Inbound state does not match the store shape, ignoring");
                crate::metrics::record_broadcast(&self.metric_name, "in", "malformed");
                return;
            }
        };
        // Re-serialize through our own type so the hash is computed over the
        // same canonical form the sender used
        let canonical = match serde_json::to_value(&value) {
            Ok(canonical) => canonical.to_string(),
            Err(_) => return,
        };
        let hash = content_hash(&canonical);

        if !sync.should_apply(&hash) {
            crate::metrics::record_broadcast(&self.metric_name, "in", "suppressed");
            return;
        }

        // Never let a remote update race the initial load
        if self.persist.is_some() {
            self.wait_hydrated().await;
        }

        sync.note_applied(&hash);
        crate::metrics::record_broadcast(&self.metric_name, "in", "applied");
        self.commit_value(value, CommitOrigin::Remote);
    }

    pub(crate) fn mark_hydrated(&self) {
        // send() would drop the value when no receiver is subscribed
        self.hydrated_tx.send_replace(true);
    }

    pub(crate) fn is_hydrated(&self) -> bool {
        *self.hydrated_tx.borrow()
    }

    pub(crate) async fn wait_hydrated(&self) {
        let mut rx = self.hydrated_tx.subscribe();
        // The sender lives in self, so this cannot fail
        let _ = rx.wait_for(|hydrated| *hydrated).await;
    }
}

/// A reactive, optionally persistent, optionally synchronized state store.
///
/// Cheap to clone; all clones share the same underlying state. See the
/// [crate docs](crate) for the full lifecycle.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Store<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("hydrated", &self.inner.is_hydrated())
            .finish()
    }
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a store with `default` as its initial value.
    ///
    /// Must be called within a tokio runtime: hydration and sync run as
    /// background tasks. Construction itself never touches storage; a store
    /// with a broken backend still works in memory.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] if sync or persistent storage is requested
    /// without a store name.
    pub fn new(default: T, options: StoreOptions<T>) -> Result<Self, StoreError> {
        let StoreOptions {
            name,
            storage,
            sync,
            on_change,
            on_rehydrate,
            hub,
            config,
        } = options;

        if sync && name.is_none() {
            return Err(StoreError::Config(
                "sync requires a store name (the broadcast channel is derived from it)".to_string(),
            ));
        }
        if storage.is_persistent() && name.is_none() {
            return Err(StoreError::Config(
                "persistent storage requires a store name (the record key is derived from it)"
                    .to_string(),
            ));
        }

        let metric_name = name.clone().unwrap_or_else(|| "anonymous".to_string());

        let backend: Option<Arc<dyn StorageBackend>> = match storage {
            StorageKind::None => None,
            StorageKind::Quota => Some(QuotaStore::global()),
            StorageKind::Embedded => Some(Arc::new(EmbeddedStore::for_name(
                &config.data_dir,
                &metric_name,
            ))),
            StorageKind::Custom(backend) => Some(backend),
        };

        let persist = backend.map(|backend| {
            Arc::new(PersistenceMiddleware::new(
                metric_name.clone(),
                backend,
                config.debounce(),
                config.persist_retry(),
            ))
        });

        let sync_channel = name.clone().map(|channel_name| {
            SyncChannel::new(channel_name, hub, config.broadcast_debounce())
        });

        // Memory-only stores are born hydrated
        let (hydrated_tx, _) = watch::channel(persist.is_none());

        let inner = Arc::new(StoreInner {
            name,
            metric_name,
            state: StateCell::new(default, on_change),
            persist,
            sync: sync_channel,
            hydrated_tx,
        });

        if inner.persist.is_some() {
            tokio::spawn(hydration::hydrate(Arc::clone(&inner), on_rehydrate));
        }

        let store = Self { inner };
        if sync {
            store.sync(true);
        }
        Ok(store)
    }

    /// The store name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Synchronous snapshot of the current value.
    #[must_use]
    pub fn current(&self) -> T {
        self.inner.state.current()
    }

    /// Replace the value wholesale.
    pub fn replace(&self, value: T) {
        self.inner.commit_value(value, CommitOrigin::Local);
    }

    /// Derive the next value from the current one and commit it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.state.current());
        self.replace(next);
    }

    /// Shallow-merge a JSON object patch into the current value.
    ///
    /// Top-level fields of `patch` overwrite the corresponding fields of the
    /// current value; all other fields are kept. Fails without committing if
    /// either side is not a JSON object or the merged result no longer
    /// matches `T`.
    pub fn merge(&self, patch: Value) -> Result<(), StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::NotAnObject(format!("merge patch: {patch}")));
        };
        let current = serde_json::to_value(self.inner.state.current())?;
        let Value::Object(mut fields) = current else {
            return Err(StoreError::NotAnObject(format!(
                "store {}: value is {current}",
                self.inner.metric_name
            )));
        };
        for (key, value) in patch {
            fields.insert(key, value);
        }
        let merged: T = serde_json::from_value(Value::Object(fields))?;
        self.replace(merged);
        Ok(())
    }

    /// Remove a top-level field from the current value.
    ///
    /// The field's absence must still deserialize into `T` (an `Option` or
    /// `#[serde(default)]` field). Removing a field that is not present is a
    /// no-op and commits nothing.
    pub fn remove(&self, field: &str) -> Result<(), StoreError> {
        let current = serde_json::to_value(self.inner.state.current())?;
        let Value::Object(mut fields) = current else {
            return Err(StoreError::NotAnObject(format!(
                "store {}: value is {current}",
                self.inner.metric_name
            )));
        };
        if fields.remove(field).is_none() {
            return Ok(());
        }
        let next: T = serde_json::from_value(Value::Object(fields))?;
        self.replace(next);
        Ok(())
    }

    /// Reset to the construction default. A normal local commit: persisted
    /// and broadcast like any other.
    pub fn reset(&self) {
        self.replace(self.inner.state.default_value());
    }

    /// Register a change listener called with `(new, old)` after every
    /// commit. The returned guard unsubscribes on drop.
    pub fn subscribe(&self, listener: impl Fn(&T, &T) + Send + Sync + 'static) -> Subscription {
        let subscription = self.inner.state.subscribe(Arc::new(listener));
        crate::metrics::set_subscribers(&self.inner.metric_name, self.inner.state.subscriber_count());
        subscription
    }

    /// A `watch` receiver tracking the committed value, for async selectors
    /// and UI binding.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<T> {
        self.inner.state.watch()
    }

    /// Toggle cross-context sync at runtime. Enabling is idempotent;
    /// disabling clears the loop-suppression hash state so a later
    /// re-enable starts fresh. No-op with a warning on unnamed stores.
    pub fn sync(&self, enabled: bool) -> &Self {
        match &self.inner.sync {
            Some(sync) => {
                if enabled {
                    sync.enable(Arc::downgrade(&self.inner));
                } else {
                    sync.disable();
                }
            }
            None => warn!("sync toggle ignored: store has no name"),
        }
        self
    }

    /// Whether sync is currently active.
    #[must_use]
    pub fn is_sync_enabled(&self) -> bool {
        self.inner.sync.as_ref().is_some_and(SyncChannel::is_enabled)
    }

    /// Whether the startup hydration has settled (trivially true for
    /// memory-only stores).
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.inner.is_hydrated()
    }

    /// Wait until hydration has settled.
    pub async fn wait_hydrated(&self) {
        self.inner.wait_hydrated().await;
    }

    /// Write the current value through to storage immediately, bypassing
    /// the debounce. For teardown paths that cannot wait.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let Some(persist) = &self.inner.persist else {
            return Ok(());
        };
        let value = serde_json::to_value(self.inner.state.current())?;
        let hash = content_hash(&value.to_string());
        persist.flush(value, hash).await;
        Ok(())
    }

    /// Reset to the default and delete the persisted record. The reset is a
    /// normal local commit, so other synced contexts converge on the
    /// default too.
    pub async fn wipe(&self) -> Result<(), StoreError> {
        self.reset();
        if let Some(persist) = &self.inner.persist {
            persist.delete_record().await?;
        }
        Ok(())
    }
}
