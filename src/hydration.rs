// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Startup load of the persisted value.
//!
//! Hydration runs once, in the background, for every store with a
//! persistent backend. It either loads the stored record, seeds one from
//! the current value, or degrades to memory-only on backend failure. When
//! it finishes (on any path) the store is marked hydrated, which releases
//! inbound remote updates held back to avoid racing the load.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RehydrateListener;
use crate::record::content_hash;
use crate::store::StoreInner;

/// Load-or-seed task spawned by the store constructor.
///
/// A persisted snapshot only wins if the caller has not committed a local
/// value in the meantime; otherwise the snapshot is stale and dropped. A
/// record that no longer deserializes is left on disk untouched and the
/// store proceeds on its default.
pub(crate) async fn hydrate<T>(inner: Arc<StoreInner<T>>, on_rehydrate: Option<RehydrateListener<T>>)
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let start = Instant::now();
    let Some(persist) = inner.persist.clone() else {
        inner.mark_hydrated();
        return;
    };
    // Persistent storage requires a name; enforced at construction.
    let key = inner.metric_name.clone();

    match persist.backend().get(&key).await {
        Ok(Some(record)) => match serde_json::from_value::<T>(record.value.clone()) {
            Ok(value) => {
                if let Some(old) = inner.state.commit_if_unmodified(value.clone()) {
                    if let Ok(canonical) = serde_json::to_value(&value) {
                        persist.note_persisted(&content_hash(&canonical.to_string()));
                    }
                    debug!(store = %key, "Hydrated store from persisted record");
                    crate::metrics::record_commit(&key, "hydration");
                    inner.state.notify(&value, &old);
                } else {
                    debug!(store = %key, "Local write preceded hydration, keeping it over the persisted snapshot");
                }
                if let Some(listener) = &on_rehydrate {
                    listener(Some(&value));
                }
            }
            Err(error) => {
                // Keep the record on disk for inspection; run on the default
                warn!(store = %key, %error, "Persisted record does not match the current shape, ignoring it");
                if let Some(listener) = &on_rehydrate {
                    listener(None);
                }
            }
        },
        Ok(None) => {
            // First run for this store name: seed the record so other
            // contexts hydrate consistently
            match serde_json::to_value(&inner.state.current()) {
                Ok(value) => {
                    let hash = content_hash(&value.to_string());
                    persist.flush(value, hash).await;
                }
                Err(error) => {
                    warn!(store = %key, %error, "Failed to serialize default value for seeding");
                }
            }
            if let Some(listener) = &on_rehydrate {
                listener(None);
            }
        }
        Err(error) => {
            warn!(store = %key, %error, "Storage backend unavailable, store runs memory-only");
            if let Some(listener) = &on_rehydrate {
                listener(None);
            }
        }
    }

    inner.mark_hydrated();
    crate::metrics::record_hydration(&key, start.elapsed());
}
