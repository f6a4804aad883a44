// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for echo-store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `echo_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `store`: store name ("anonymous" for unnamed stores)
//! - `origin`: local, hydration, remote
//! - `status`: success, error, skipped

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a state commit.
pub fn record_commit(store: &str, origin: &str) {
    counter!(
        "echo_store_commits_total",
        "store" => store.to_string(),
        "origin" => origin.to_string()
    )
    .increment(1);
}

/// Record a persistence write outcome.
pub fn record_persist(store: &str, status: &str) {
    counter!(
        "echo_store_persist_writes_total",
        "store" => store.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record persistence write latency (including retries).
pub fn record_persist_latency(store: &str, duration: Duration) {
    histogram!(
        "echo_store_persist_seconds",
        "store" => store.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a broadcast sent or applied.
pub fn record_broadcast(store: &str, direction: &str, status: &str) {
    counter!(
        "echo_store_broadcasts_total",
        "store" => store.to_string(),
        "direction" => direction.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record hydration duration.
pub fn record_hydration(store: &str, duration: Duration) {
    histogram!(
        "echo_store_hydration_seconds",
        "store" => store.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set the subscriber count for a store.
pub fn set_subscribers(store: &str, count: usize) {
    gauge!(
        "echo_store_subscribers",
        "store" => store.to_string()
    )
    .set(count as f64);
}

/// Set quota namespace usage in bytes.
pub fn set_quota_used_bytes(bytes: usize) {
    gauge!("echo_store_quota_used_bytes").set(bytes as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; the tests only assert
    // the helpers don't panic with the label shapes we use.

    #[test]
    fn test_commit_metrics() {
        record_commit("settings", "local");
        record_commit("settings", "remote");
        record_commit("anonymous", "hydration");
    }

    #[test]
    fn test_persist_metrics() {
        record_persist("settings", "success");
        record_persist("settings", "error");
        record_persist("settings", "skipped");
        record_persist_latency("settings", Duration::from_millis(3));
    }

    #[test]
    fn test_broadcast_metrics() {
        record_broadcast("history", "out", "sent");
        record_broadcast("history", "in", "applied");
        record_broadcast("history", "in", "malformed");
    }

    #[test]
    fn test_gauges() {
        set_subscribers("settings", 2);
        set_quota_used_bytes(4096);
        record_hydration("settings", Duration::from_millis(12));
    }
}
