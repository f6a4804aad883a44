// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic echo-store usage example.
//!
//! Demonstrates:
//! 1. Creating a named, persisted, synchronized store
//! 2. Simulating a second window on the same broadcast hub
//! 3. Watching changes propagate between the two
//! 4. Displaying metrics (OTEL-compatible)
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde::{Deserialize, Serialize};
use serde_json::json;

use echo_store::{StorageKind, Store, StoreConfig, StoreOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    font_size: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             echo-store: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    let data_dir = std::env::temp_dir().join("echo-store-demo");
    let config = StoreConfig {
        debounce_ms: 50,
        broadcast_debounce_ms: 20,
        data_dir: data_dir.clone(),
        ..Default::default()
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Create a named, persisted, synchronized store
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Creating 'settings' store (embedded SQLite, sync on)...");

    let settings = Store::new(
        Settings {
            theme: "light".into(),
            font_size: 12,
        },
        StoreOptions::named("settings")
            .storage(StorageKind::Embedded)
            .sync(true)
            .on_rehydrate(|loaded: Option<&Settings>| match loaded {
                Some(value) => println!("   └─ Hydrated from disk: {value:?}"),
                None => println!("   └─ First run, record seeded"),
            })
            .config(config.clone()),
    )?;
    settings.wait_hydrated().await;
    println!("   ✅ Hydrated. Current: {:?}", settings.current());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Simulate a second window on the same hub
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🪟 Opening a second 'window' on the same store name...");

    let other_window = Store::new(
        Settings::default(),
        StoreOptions::named("settings")
            .storage(StorageKind::Embedded)
            .sync(true)
            .config(config),
    )?;
    other_window.wait_hydrated().await;

    let _guard = other_window.subscribe(|new: &Settings, old: &Settings| {
        println!("   └─ Window 2 saw change: {old:?} -> {new:?}");
    });

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Mutate in window 1, watch it propagate
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Updating theme in window 1 (merge)...");
    let start = std::time::Instant::now();
    settings.merge(json!({"theme": "dark"}))?;
    println!("   ⚡ merge returned in {:?} (commit is synchronous)", start.elapsed());

    println!("\n📝 Bumping font size 5 times in window 1 (update)...");
    for _ in 0..5 {
        settings.update(|s| Settings {
            font_size: s.font_size + 1,
            ..s.clone()
        });
    }
    println!("   └─ Window 1 current: {:?}", settings.current());

    // Let the debounced persistence write and broadcast land
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("   └─ Window 2 current: {:?}", other_window.current());
    assert_eq!(settings.current(), other_window.current());
    println!("   ✅ Windows converged!");

    settings.flush().await?;

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Dump raw metrics (OTEL-compatible)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    println!("\n💡 Data remains in SQLite - inspect with:");
    println!("   └─ sqlite3 {} 'SELECT * FROM records;'", data_dir.join("settings.db").display());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics in OTEL-compatible format
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name();
        let labels: Vec<_> = key
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };

        match value {
            DebugValue::Counter(v) => counters.push((name.to_string(), label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name.to_string(), label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name.to_string(), label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, labels, value) in &counters {
        println!("   ├─ {}{} = {}", name, labels, value);
    }
    for (name, labels, value) in &gauges {
        println!("   ├─ {}{} = {:.2}", name, labels, value);
    }
    for (name, labels, count, sum) in &histograms {
        println!("   └─ {}{} count={} sum={:.4}s", name, labels, count, sum);
    }

    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
