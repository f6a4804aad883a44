// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-group broadcast registry.
//!
//! A [`BroadcastHub`] maps channel names to `tokio::sync::broadcast`
//! senders. All execution contexts of one logical application share a hub;
//! [`BroadcastHub::global`] is the process-wide default, and tests create
//! fresh hubs to simulate isolated window groups.
//!
//! Channels are scoped per store as `"echo-" + store_name`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::broadcast;

/// Channel name prefix for store sync traffic.
pub const CHANNEL_PREFIX: &str = "echo-";

static GLOBAL: Lazy<Arc<BroadcastHub>> = Lazy::new(|| Arc::new(BroadcastHub::new(64)));

pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl BroadcastHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// The process-wide hub shared by all stores by default.
    #[must_use]
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Sender for the named store's channel, creating it on first use.
    /// Subscribe via `sender.subscribe()`.
    #[must_use]
    pub fn channel(&self, store_name: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(format!("{CHANNEL_PREFIX}{store_name}"))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Number of distinct channels created so far.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_name_shares_channel() {
        let hub = BroadcastHub::new(8);
        let a = hub.channel("settings");
        let mut rx = hub.channel("settings").subscribe();

        a.send("hello".to_string()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
        assert_eq!(hub.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_different_names_are_isolated() {
        let hub = BroadcastHub::new(8);
        let settings = hub.channel("settings");
        let mut history_rx = hub.channel("history").subscribe();

        // No receiver on "settings" yet; send fails without panicking
        let _ = settings.send("x".to_string());
        assert!(history_rx.try_recv().is_err());
        assert_eq!(hub.channel_count(), 2);
    }

    #[test]
    fn test_global_is_shared() {
        let a = BroadcastHub::global();
        let b = BroadcastHub::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_channel_prefix() {
        let hub = BroadcastHub::new(8);
        let _ = hub.channel("settings");
        assert!(hub.channels.contains_key("echo-settings"));
    }
}
