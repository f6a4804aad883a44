// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Single-slot debouncer.
//!
//! Delays an effect until a quiet period elapses after the last trigger,
//! coalescing bursts into one effect. The pending timer is an arena of size
//! one, not a queue: scheduling a new effect cancels and replaces any timer
//! already pending, so only the latest effect within a window ever runs.
//!
//! # Example
//!
//! ```
//! use echo_store::Debouncer;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let debouncer = Debouncer::new(Duration::from_millis(10));
//! debouncer.schedule(async { /* superseded, never runs */ });
//! debouncer.schedule(async { println!("only this runs"); });
//! tokio::time::sleep(Duration::from_millis(30)).await;
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `effect` to run after the quiet interval, cancelling and
    /// replacing any effect already pending.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, effect: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            effect.await;
        });

        if let Some(old) = self.pending.lock().replace(handle) {
            old.abort();
        }
    }

    /// Cancel any pending effect.
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }

    /// Whether a timer is currently pending (not yet fired or aborted).
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.get_mut().take() {
            handle.abort();
        }
    }
}
