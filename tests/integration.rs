//! Integration Tests for Echo Store
//!
//! End-to-end coverage of the store lifecycle: commit pipeline, debounced
//! persistence, hydration, and cross-context sync. Multiple "windows" are
//! simulated as store handles sharing one [`BroadcastHub`] and one storage
//! backend.
//!
//! # Test Organization
//! - `happy_*` - Normal operation: reads, persistence, sync convergence
//! - `failure_*` - Failure scenarios: broken backends, quota exhaustion
//! - `coverage_*` - Specific contracts: hydration races, loop suppression

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;

use echo_store::{
    BroadcastHub, PersistedRecord, QuotaStore, StorageBackend, StorageError, StorageKind, Store,
    StoreConfig, StoreOptions,
};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Settings {
    theme: String,
    #[serde(default)]
    font_size: Option<u32>,
}

fn dark() -> Settings {
    Settings {
        theme: "dark".into(),
        font_size: Some(14),
    }
}

/// Short debounces so tests settle quickly.
fn fast_config() -> StoreConfig {
    StoreConfig {
        debounce_ms: 5,
        broadcast_debounce_ms: 5,
        persist_retry_delay_ms: 1,
        ..StoreConfig::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Backend whose reads are delayed, to widen the hydration window.
struct SlowBackend {
    inner: Arc<QuotaStore>,
    read_delay: Duration,
}

#[async_trait]
impl StorageBackend for SlowBackend {
    async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StorageError> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, record: &PersistedRecord) -> Result<(), StorageError> {
        self.inner.set(record).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }
}

/// Backend that refuses every operation.
struct DeadBackend;

#[async_trait]
impl StorageBackend for DeadBackend {
    async fn get(&self, _key: &str) -> Result<Option<PersistedRecord>, StorageError> {
        Err(StorageError::Backend("backend is down".into()))
    }

    async fn set(&self, _record: &PersistedRecord) -> Result<(), StorageError> {
        Err(StorageError::Backend("backend is down".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("backend is down".into()))
    }
}

/// A simulated window: a synced store handle on a shared hub and backend.
fn window(
    name: &str,
    hub: &Arc<BroadcastHub>,
    backend: &Arc<QuotaStore>,
) -> Store<Settings> {
    Store::new(
        Settings::default(),
        StoreOptions::named(name)
            .storage(StorageKind::Custom(backend.clone()))
            .sync(true)
            .hub(Some(hub.clone()))
            .config(fast_config()),
    )
    .expect("store construction")
}

// =============================================================================
// Happy Path: reads and persistence
// =============================================================================

#[tokio::test]
async fn happy_read_your_write_is_synchronous() {
    let store = Store::new(Settings::default(), StoreOptions::default()).unwrap();

    store.replace(dark());
    // No await between write and read
    assert_eq!(store.current(), dark());
}

#[tokio::test]
async fn happy_burst_of_commits_coalesces_into_one_write() {
    let backend = Arc::new(QuotaStore::new(1024 * 1024));
    let writes = Arc::new(AtomicUsize::new(0));

    struct Counting {
        inner: Arc<QuotaStore>,
        writes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StorageBackend for Counting {
        async fn get(&self, key: &str) -> Result<Option<PersistedRecord>, StorageError> {
            self.inner.get(key).await
        }
        async fn set(&self, record: &PersistedRecord) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(record).await
        }
        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    // Pre-seed so hydration does not add a write of its own
    backend
        .set(&PersistedRecord::new(
            "burst",
            serde_json::to_value(Settings::default()).unwrap(),
        ))
        .await
        .unwrap();

    let store = Store::new(
        Settings::default(),
        StoreOptions::named("burst")
            .storage(StorageKind::Custom(Arc::new(Counting {
                inner: backend,
                writes: writes.clone(),
            })))
            .config(fast_config()),
    )
    .unwrap();
    store.wait_hydrated().await;

    for size in 1..=10u32 {
        store.replace(Settings {
            theme: "dark".into(),
            font_size: Some(size),
        });
    }
    settle().await;

    assert_eq!(writes.load(Ordering::SeqCst), 1);
    assert_eq!(store.current().font_size, Some(10));
}

#[tokio::test]
async fn happy_value_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        data_dir: dir.path().to_path_buf(),
        ..fast_config()
    };

    {
        let store = Store::new(
            Settings::default(),
            StoreOptions::named("restart")
                .storage(StorageKind::Embedded)
                .config(config.clone()),
        )
        .unwrap();
        store.wait_hydrated().await;
        store.replace(dark());
        store.flush().await.unwrap();
    }

    // "Restart": a fresh store against the same data dir
    let rehydrated = Arc::new(Mutex::new(None));
    let rehydrated_clone = rehydrated.clone();
    let store = Store::new(
        Settings::default(),
        StoreOptions::named("restart")
            .storage(StorageKind::Embedded)
            .on_rehydrate(move |loaded: Option<&Settings>| {
                *rehydrated_clone.lock() = Some(loaded.cloned());
            })
            .config(config),
    )
    .unwrap();
    store.wait_hydrated().await;

    assert_eq!(store.current(), dark());
    assert_eq!(*rehydrated.lock(), Some(Some(dark())));
}

#[tokio::test]
async fn happy_first_run_seeds_record_and_reports_none() {
    let backend = Arc::new(QuotaStore::new(1024 * 1024));
    let rehydrated = Arc::new(Mutex::new(None));
    let rehydrated_clone = rehydrated.clone();

    let store = Store::new(
        dark(),
        StoreOptions::named("seeded")
            .storage(StorageKind::Custom(backend.clone()))
            .on_rehydrate(move |loaded: Option<&Settings>| {
                *rehydrated_clone.lock() = Some(loaded.cloned());
            })
            .config(fast_config()),
    )
    .unwrap();
    store.wait_hydrated().await;

    // No prior record: listener gets None, default is seeded
    assert_eq!(*rehydrated.lock(), Some(None));
    let record = backend.get("seeded").await.unwrap().unwrap();
    assert_eq!(record.value["theme"], "dark");
}

// =============================================================================
// Happy Path: cross-context sync
// =============================================================================

#[tokio::test]
async fn happy_two_windows_converge() {
    let hub = Arc::new(BroadcastHub::new(16));
    let backend = Arc::new(QuotaStore::new(1024 * 1024));

    let window_a = window("converge", &hub, &backend);
    let window_b = window("converge", &hub, &backend);
    window_a.wait_hydrated().await;
    window_b.wait_hydrated().await;

    let seen_by_b = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen_by_b.clone();
    let _guard = window_b.subscribe(move |new: &Settings, old: &Settings| {
        seen_clone.lock().push((new.clone(), old.clone()));
    });

    window_a.replace(dark());
    settle().await;

    assert_eq!(window_b.current(), dark());
    assert_eq!(
        seen_by_b.lock().as_slice(),
        &[(dark(), Settings::default())]
    );
}

#[tokio::test]
async fn happy_remote_update_is_persisted() {
    let hub = Arc::new(BroadcastHub::new(16));
    let backend = Arc::new(QuotaStore::new(1024 * 1024));

    let window_a = window("remote-persist", &hub, &backend);
    let window_b = window("remote-persist", &hub, &backend);
    window_a.wait_hydrated().await;
    window_b.wait_hydrated().await;

    window_a.replace(dark());
    settle().await;

    // Both windows share the backend; the record holds the update no matter
    // which side wrote it
    let record = backend.get("remote-persist").await.unwrap().unwrap();
    assert_eq!(record.value["theme"], "dark");
    assert_eq!(window_b.current(), dark());
}

#[tokio::test]
async fn happy_sync_disabled_window_stays_isolated() {
    let hub = Arc::new(BroadcastHub::new(16));
    let backend = Arc::new(QuotaStore::new(1024 * 1024));

    let window_a = window("isolated", &hub, &backend);
    let window_b = window("isolated", &hub, &backend);
    window_a.wait_hydrated().await;
    window_b.wait_hydrated().await;

    window_b.sync(false);
    window_a.replace(dark());
    settle().await;

    assert_eq!(window_b.current(), Settings::default());

    // Re-enabling picks up future updates, not missed ones
    window_b.sync(true);
    window_a.merge(json!({"font_size": 16})).unwrap();
    settle().await;
    assert_eq!(window_b.current().font_size, Some(16));
}

// =============================================================================
// Coverage: loop suppression and hydration races
// =============================================================================

#[tokio::test]
async fn coverage_own_broadcast_is_not_reapplied() {
    let hub = Arc::new(BroadcastHub::new(16));
    let backend = Arc::new(QuotaStore::new(1024 * 1024));

    let changes = Arc::new(AtomicUsize::new(0));
    let changes_clone = changes.clone();
    let window_a = Store::new(
        Settings::default(),
        StoreOptions::named("echo-check")
            .storage(StorageKind::Custom(backend.clone() as Arc<dyn StorageBackend>))
            .sync(true)
            .hub(Some(hub.clone()))
            .on_change(move |_: &Settings, _: &Settings| {
                changes_clone.fetch_add(1, Ordering::SeqCst);
            })
            .config(fast_config()),
    )
    .unwrap();
    let _window_b = window("echo-check", &hub, &backend);
    window_a.wait_hydrated().await;

    window_a.replace(dark());
    settle().await;

    // The broadcast sender receives its own message; the sent-hash check
    // must drop it instead of committing a second time
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn coverage_update_ping_pong_settles() {
    let hub = Arc::new(BroadcastHub::new(16));
    let backend = Arc::new(QuotaStore::new(1024 * 1024));

    let window_a = window("ping-pong", &hub, &backend);
    let window_b = window("ping-pong", &hub, &backend);
    window_a.wait_hydrated().await;
    window_b.wait_hydrated().await;

    window_a.replace(dark());
    settle().await;
    settle().await;

    // Identical content hashes on both sides; nothing left in flight
    assert_eq!(window_a.current(), dark());
    assert_eq!(window_b.current(), dark());
}

#[tokio::test]
async fn coverage_local_write_beats_slow_hydration() {
    let inner = Arc::new(QuotaStore::new(1024 * 1024));
    inner
        .set(&PersistedRecord::new(
            "slow-hydrate",
            serde_json::to_value(Settings {
                theme: "stale".into(),
                font_size: None,
            })
            .unwrap(),
        ))
        .await
        .unwrap();

    let store = Store::new(
        Settings::default(),
        StoreOptions::named("slow-hydrate")
            .storage(StorageKind::Custom(Arc::new(SlowBackend {
                inner,
                read_delay: Duration::from_millis(50),
            })))
            .config(fast_config()),
    )
    .unwrap();

    // Write before hydration finishes: the persisted snapshot is stale
    store.replace(dark());
    store.wait_hydrated().await;

    assert_eq!(store.current(), dark());
}

#[tokio::test]
async fn coverage_hydration_applies_when_no_local_write() {
    let inner = Arc::new(QuotaStore::new(1024 * 1024));
    inner
        .set(&PersistedRecord::new(
            "calm-hydrate",
            serde_json::to_value(dark()).unwrap(),
        ))
        .await
        .unwrap();

    let store = Store::new(
        Settings::default(),
        StoreOptions::named("calm-hydrate")
            .storage(StorageKind::Custom(Arc::new(SlowBackend {
                inner,
                read_delay: Duration::from_millis(20),
            })))
            .config(fast_config()),
    )
    .unwrap();
    store.wait_hydrated().await;

    assert_eq!(store.current(), dark());
}

// =============================================================================
// Failure Scenarios
// =============================================================================

#[tokio::test]
async fn failure_dead_backend_degrades_to_memory_only() {
    let store = Store::new(
        Settings::default(),
        StoreOptions::named("dead-backend")
            .storage(StorageKind::Custom(Arc::new(DeadBackend)))
            .config(fast_config()),
    )
    .unwrap();
    store.wait_hydrated().await;

    // Reads and writes keep working without storage
    store.replace(dark());
    assert_eq!(store.current(), dark());
    settle().await;
}

#[tokio::test]
async fn failure_quota_exhaustion_does_not_break_the_store() {
    let tiny = Arc::new(QuotaStore::new(64));
    let store = Store::new(
        Settings::default(),
        StoreOptions::named("quota-full")
            .storage(StorageKind::Custom(tiny.clone() as Arc<dyn StorageBackend>))
            .config(fast_config()),
    )
    .unwrap();
    store.wait_hydrated().await;

    store.replace(Settings {
        theme: "a-theme-name-far-too-long-for-sixty-four-bytes-of-quota".into(),
        font_size: Some(99),
    });
    settle().await;

    // The write was rejected but the in-memory value stands; the record
    // still holds the last value that fit (the seeded default)
    assert_eq!(store.current().font_size, Some(99));
    let record = tiny.get("quota-full").await.unwrap().unwrap();
    assert_eq!(record.value["theme"], "");
}

#[tokio::test]
async fn failure_corrupt_record_keeps_default_and_record() {
    let backend = Arc::new(QuotaStore::new(1024 * 1024));
    // A record whose shape no longer matches Settings
    backend
        .set(&PersistedRecord::new(
            "corrupt",
            json!({"theme": 42, "bogus": true}),
        ))
        .await
        .unwrap();

    let rehydrated = Arc::new(Mutex::new(None));
    let rehydrated_clone = rehydrated.clone();
    let store = Store::new(
        Settings::default(),
        StoreOptions::named("corrupt")
            .storage(StorageKind::Custom(backend.clone() as Arc<dyn StorageBackend>))
            .on_rehydrate(move |loaded: Option<&Settings>| {
                *rehydrated_clone.lock() = Some(loaded.cloned());
            })
            .config(fast_config()),
    )
    .unwrap();
    store.wait_hydrated().await;

    assert_eq!(store.current(), Settings::default());
    assert_eq!(*rehydrated.lock(), Some(None));
    // The unreadable record is left in place for inspection
    assert!(backend.get("corrupt").await.unwrap().is_some());
}
