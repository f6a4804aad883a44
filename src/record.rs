// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire and storage data shapes.
//!
//! The [`PersistedRecord`] is the unit of persistence (one record per store
//! name) and the [`BroadcastEnvelope`] is the unit of synchronization between
//! execution contexts. Both carry the store value in its canonical JSON form.
//!
//! # Example
//!
//! ```
//! use echo_store::{BroadcastEnvelope, content_hash};
//! use serde_json::json;
//!
//! let envelope = BroadcastEnvelope::new(json!({"count": 5}));
//! let wire = envelope.to_wire().unwrap();
//!
//! // Only well-formed envelopes parse back; garbage is rejected, not fatal.
//! assert!(BroadcastEnvelope::from_wire(&wire).is_some());
//! assert!(BroadcastEnvelope::from_wire("{\"type\":\"other\"}").is_none());
//!
//! // Hashes are stable fingerprints of the canonical serialization.
//! assert_eq!(content_hash("{\"a\":1}"), content_hash("{\"a\":1}"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Envelope `type` tag. Only envelopes carrying this tag are applied.
pub const ENVELOPE_TYPE: &str = "state-update";

/// A persisted store value, keyed by the store name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Store name (the persistence key).
    pub key: String,
    /// Canonical JSON form of the store value.
    pub value: Value,
}

impl PersistedRecord {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// The cross-context broadcast message.
///
/// Sent as JSON text over a channel named `"echo-" + store_name`. Receivers
/// validate the shape before applying; anything malformed is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    /// Message discriminator, always [`ENVELOPE_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The full store value (replace semantics on apply).
    pub state: Value,
    /// Send time, epoch millis. Informational only; ordering is by arrival.
    pub timestamp: i64,
}

impl BroadcastEnvelope {
    pub fn new(state: Value) -> Self {
        Self {
            kind: ENVELOPE_TYPE.to_string(),
            state,
            timestamp: epoch_millis(),
        }
    }

    /// Serialize for the broadcast channel.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse and validate an inbound message.
    ///
    /// Returns `None` for anything that is not a well-formed state-update
    /// envelope. Malformed traffic must never crash the receiver.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        let envelope: Self = serde_json::from_str(raw).ok()?;
        if envelope.kind != ENVELOPE_TYPE {
            return None;
        }
        Some(envelope)
    }
}

/// SHA-256 hex fingerprint of a canonical serialization.
///
/// Used purely to detect "no real change" on the persistence and broadcast
/// paths. Not a security primitive: a collision causes a benign skip (at
/// worst one delayed broadcast), never data loss.
#[must_use]
pub fn content_hash(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn epoch_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
