// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cross-context synchronization channel.
//!
//! Outbound: local commits are debounced, wrapped in a
//! [`BroadcastEnvelope`](crate::record::BroadcastEnvelope) and sent on the
//! store's hub channel. Inbound: a background task receives envelopes,
//! validates them and applies them as `Remote` commits.
//!
//! Loop suppression is hash based. The channel remembers the content hash
//! of the last state it sent and the last state it applied; an inbound
//! envelope matching either is dropped. The sent-hash check also absorbs
//! self delivery, since a broadcast sender's own subscription receives its
//! own messages.

pub mod hub;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::metrics;
use crate::record::BroadcastEnvelope;
use crate::state::CommitOrigin;
use crate::store::StoreInner;

pub use hub::BroadcastHub;

#[derive(Default)]
struct SyncHashes {
    last_sent: Option<String>,
    last_applied: Option<String>,
}

struct Enabled {
    sender: broadcast::Sender<String>,
    inbound: JoinHandle<()>,
}

/// Per-store sync state. Exists only for named stores; toggled on and off
/// over the store's lifetime.
pub(crate) struct SyncChannel {
    name: String,
    hub: Option<Arc<BroadcastHub>>,
    debouncer: Debouncer,
    enabled: Mutex<Option<Enabled>>,
    hashes: Arc<Mutex<SyncHashes>>,
}

impl SyncChannel {
    pub(crate) fn new(
        name: impl Into<String>,
        hub: Option<Arc<BroadcastHub>>,
        debounce: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            hub,
            debouncer: Debouncer::new(debounce),
            enabled: Mutex::new(None),
            hashes: Arc::new(Mutex::new(SyncHashes::default())),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.lock().is_some()
    }

    /// Start broadcasting and listening. Idempotent while enabled.
    pub(crate) fn enable<T>(&self, inner: Weak<StoreInner<T>>)
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let mut guard = self.enabled.lock();
        if guard.is_some() {
            return;
        }
        let Some(hub) = &self.hub else {
            warn!(store = %self.name, "sync requested but no broadcast hub configured; store runs standalone");
            return;
        };
        let sender = hub.channel(&self.name);
        let mut rx = sender.subscribe();
        let store = self.name.clone();

        let inbound = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(raw) => {
                        let Some(inner) = inner.upgrade() else { break };
                        match BroadcastEnvelope::from_wire(&raw) {
                            Some(envelope) => inner.apply_remote(envelope).await,
                            None => {
                                debug!(store = %store, "ignoring malformed broadcast message");
                                metrics::record_broadcast(&store, "in", "malformed");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Older intermediate states were dropped; the next
                        // message carries the latest full snapshot.
                        warn!(store = %store, skipped, "broadcast receiver lagged");
                        metrics::record_broadcast(&store, "in", "lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        *guard = Some(Enabled { sender, inbound });
    }

    /// Stop sync activity and forget hash state, so a later re-enable
    /// starts with a clean slate.
    pub(crate) fn disable(&self) {
        let mut guard = self.enabled.lock();
        if let Some(enabled) = guard.take() {
            enabled.inbound.abort();
        }
        drop(guard);
        self.debouncer.cancel();
        let mut hashes = self.hashes.lock();
        hashes.last_sent = None;
        hashes.last_applied = None;
    }

    /// Schedule a debounced broadcast of a local commit. Non-local commits
    /// and states matching a recently sent or applied hash are dropped.
    pub(crate) fn on_commit(&self, value: Value, hash: String, origin: CommitOrigin) {
        if origin != CommitOrigin::Local {
            return;
        }
        let guard = self.enabled.lock();
        let Some(enabled) = guard.as_ref() else {
            return;
        };
        {
            let hashes = self.hashes.lock();
            if hashes.last_sent.as_deref() == Some(hash.as_str())
                || hashes.last_applied.as_deref() == Some(hash.as_str())
            {
                metrics::record_broadcast(&self.name, "out", "suppressed");
                return;
            }
        }
        let sender = enabled.sender.clone();
        drop(guard);

        let store = self.name.clone();
        let hashes = Arc::clone(&self.hashes);
        self.debouncer.schedule(async move {
            hashes.lock().last_sent = Some(hash);
            let envelope = BroadcastEnvelope::new(value);
            match envelope.to_wire() {
                Ok(raw) => {
                    // Err here just means no other context is listening
                    let receivers = sender.send(raw).unwrap_or(0);
                    debug!(store = %store, receivers, "broadcast state update");
                    metrics::record_broadcast(&store, "out", "sent");
                }
                Err(error) => {
                    warn!(store = %store, %error, "failed to encode broadcast envelope");
                    metrics::record_broadcast(&store, "out", "error");
                }
            }
        });
    }

    /// Whether an inbound state with this hash should be applied.
    pub(crate) fn should_apply(&self, hash: &str) -> bool {
        let hashes = self.hashes.lock();
        hashes.last_sent.as_deref() != Some(hash) && hashes.last_applied.as_deref() != Some(hash)
    }

    pub(crate) fn note_applied(&self, hash: &str) {
        self.hashes.lock().last_applied = Some(hash.to_string());
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        if let Some(enabled) = self.enabled.lock().take() {
            enabled.inbound.abort();
        }
    }
}
