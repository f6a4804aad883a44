// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory state container.
//!
//! [`StateCell`] holds the current value and applies commits synchronously.
//! Reads and commits never suspend: UI-facing access is never blocked by
//! storage or broadcast latency. Side effects (persistence, broadcast) are
//! driven by the facade from the commit result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::config::ChangeListener;

/// Where a commit came from. Hydration commits must not re-trigger
/// persistence; remote commits must not re-trigger their own broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOrigin {
    /// A caller mutation (`replace`, `update`, `merge`, `remove`, `reset`).
    Local,
    /// The one-time startup load of the persisted value.
    Hydration,
    /// An inbound broadcast from another context.
    Remote,
}

impl CommitOrigin {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hydration => "hydration",
            Self::Remote => "remote",
        }
    }
}

type SubscriberList<T> = Arc<Mutex<Vec<(u64, ChangeListener<T>)>>>;

pub(crate) struct StateCell<T> {
    value: RwLock<T>,
    default: T,
    /// Count of Local commits since construction (hydration stale-snapshot guard).
    local_commits: AtomicU64,
    subscribers: SubscriberList<T>,
    next_subscriber_id: AtomicU64,
    on_change: Option<ChangeListener<T>>,
    watch_tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> StateCell<T> {
    pub fn new(default: T, on_change: Option<ChangeListener<T>>) -> Self {
        let (watch_tx, _) = watch::channel(default.clone());
        Self {
            value: RwLock::new(default.clone()),
            default,
            local_commits: AtomicU64::new(0),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(0),
            on_change,
            watch_tx,
        }
    }

    /// Synchronous read of the latest committed value.
    pub fn current(&self) -> T {
        self.value.read().clone()
    }

    /// The construction default (for `reset` and `wipe`).
    pub fn default_value(&self) -> T {
        self.default.clone()
    }

    /// Swap in a new value. Returns the previous value.
    ///
    /// The new value is visible to [`current`](Self::current) before this
    /// returns; listeners are notified separately via [`notify`](Self::notify)
    /// so the facade can order side effects first.
    pub fn commit(&self, new: T, origin: CommitOrigin) -> T {
        let old = {
            let mut guard = self.value.write();
            if origin == CommitOrigin::Local {
                self.local_commits.fetch_add(1, Ordering::Release);
            }
            std::mem::replace(&mut *guard, new.clone())
        };

        self.watch_tx.send_replace(new);
        old
    }

    /// Like [`commit`](Self::commit) with `Hydration` origin, but only if no
    /// local commit has happened yet. The check and the swap share the write
    /// lock, so a racing `set` either lands before (hydration skipped) or
    /// after (hydration overwritten) as a whole.
    pub fn commit_if_unmodified(&self, new: T) -> Option<T> {
        let old = {
            let guard = self.value.upgradable_read();
            if self.local_commits.load(Ordering::Acquire) != 0 {
                return None;
            }
            let mut guard = parking_lot::RwLockUpgradableReadGuard::upgrade(guard);
            std::mem::replace(&mut *guard, new.clone())
        };

        self.watch_tx.send_replace(new);
        Some(old)
    }

    /// Invoke `on_change` and all subscribers with `(new, old)`, exactly once
    /// per commit. Callbacks run outside the value lock, so a listener may
    /// read (or even mutate) the store reentrantly.
    pub fn notify(&self, new: &T, old: &T) {
        if let Some(ref on_change) = self.on_change {
            on_change(new, old);
        }

        let listeners: Vec<ChangeListener<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(new, old);
        }
    }

    pub fn subscribe(&self, listener: ChangeListener<T>) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, listener));
        Subscription {
            id,
            remove: Box::new({
                let subscribers = Arc::downgrade(&self.subscribers);
                move |id| {
                    if let Some(subscribers) = subscribers.upgrade() {
                        subscribers.lock().retain(|(sid, _)| *sid != id);
                    }
                }
            }),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// A reactive read handle for UI binding.
    pub fn watch(&self) -> watch::Receiver<T> {
        self.watch_tx.subscribe()
    }
}

type RemoveFn = Box<dyn Fn(u64) + Send + Sync>;

/// Subscription guard returned by [`crate::Store::subscribe`].
///
/// The listener stays registered until the guard is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called.
#[must_use = "dropping the Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    remove: RemoveFn,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    /// Keep the listener registered for the life of the store.
    pub fn forever(mut self) {
        self.remove = Box::new(|_| {});
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        (self.remove)(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
