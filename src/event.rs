//! Audit Events
//!
//! Defines the immutable audit event that feeds the batcher,
//! with a fixed-order canonical encoding for hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ChainError;

/// Sentinel hash used for genesis links and empty payloads.
pub const ZERO_HASH: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// Hash raw bytes into the canonical `sha256:<hex>` form.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// A single audit event. Immutable once created: every field participates
/// in the canonical encoding, so any later change is detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub event_type: String,
    pub payload_hash: String,
    pub metadata: HashMap<String, String>,
}

impl AuditEvent {
    /// Create a new audit event stamped with the current time.
    pub fn new(
        actor: String,
        event_type: String,
        payload_hash: String,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor,
            event_type,
            payload_hash,
            metadata,
        }
    }

    /// Create an event whose payload hash is computed from raw bytes.
    pub fn from_payload(
        actor: String,
        event_type: String,
        payload: &[u8],
        metadata: HashMap<String, String>,
    ) -> Self {
        Self::new(actor, event_type, hash_bytes(payload), metadata)
    }

    /// Validate the fixed required fields at ingestion.
    ///
    /// The metadata map stays open; only the schema fields are checked.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.actor.trim().is_empty() {
            return Err(ChainError::InvalidEvent("actor must not be empty".to_string()));
        }
        if self.event_type.trim().is_empty() {
            return Err(ChainError::InvalidEvent(
                "event type must not be empty".to_string(),
            ));
        }
        let hex_part = self
            .payload_hash
            .strip_prefix("sha256:")
            .ok_or_else(|| {
                ChainError::InvalidEvent(format!(
                    "payload hash must be sha256-prefixed, got '{}'",
                    self.payload_hash
                ))
            })?;
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChainError::InvalidEvent(
                "payload hash must be 64 hex characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Create canonical string representation for hashing.
    ///
    /// Fixed field order, millisecond timestamp, key-sorted metadata.
    /// No floating-point or locale-dependent formatting.
    pub fn canonical_string(&self) -> String {
        format!(
            "id:{}|timestamp_ms:{}|actor:{}|type:{}|payload_hash:{}|metadata:{}",
            self.id,
            self.timestamp.timestamp_millis(),
            self.actor,
            self.event_type,
            self.payload_hash,
            self.serialize_metadata()
        )
    }

    /// Calculate SHA256 hash of this event's canonical encoding.
    pub fn hash(&self) -> String {
        hash_bytes(self.canonical_string().as_bytes())
    }

    /// Serialize metadata to string for hashing.
    fn serialize_metadata(&self) -> String {
        let mut items: Vec<String> = self
            .metadata
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        items.sort(); // Ensure deterministic ordering
        items.join(",")
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!("{}: {} by {}", self.event_type, self.id, self.actor)
    }
}
