//! External Anchor Store
//!
//! The chain does not persist its own commitments: publication to a
//! content-addressable store is an injected capability. Anchoring is
//! decoupled from chain append, retried with a per-attempt timeout, and
//! its outcome is reported back as an audit event by the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::event::hash_bytes;

/// Content-addressable store capability. `put` returns a content id
/// any party can later `get` to retrieve the published bytes.
#[async_trait]
pub trait AnchorStore: Send + Sync {
    async fn put(&self, content: &[u8]) -> Result<String, ChainError>;
    async fn get(&self, content_id: &str) -> Result<Option<Vec<u8>>, ChainError>;
}

/// In-memory content-addressable store for tests and local operation.
#[derive(Debug, Default)]
pub struct MemoryAnchorStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content ids are derived from the content hash, so identical
    /// content always maps to the same id.
    pub fn content_id(content: &[u8]) -> String {
        let digest = hash_bytes(content);
        format!("cid:{}", digest.trim_start_matches("sha256:"))
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl AnchorStore for MemoryAnchorStore {
    async fn put(&self, content: &[u8]) -> Result<String, ChainError> {
        let cid = Self::content_id(content);
        self.objects
            .lock()
            .await
            .insert(cid.clone(), content.to_vec());
        debug!(cid = %cid, bytes = content.len(), "Stored anchor content");
        Ok(cid)
    }

    async fn get(&self, content_id: &str) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.objects.lock().await.get(content_id).cloned())
    }
}

/// Receipt returned once content has been anchored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub anchor_id: String,
    pub content_id: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Drives anchoring against an injected store with bounded retry.
///
/// Timeouts apply only here: chain append never blocks on anchor
/// confirmation.
pub struct AnchorManager {
    store: Arc<dyn AnchorStore>,
    max_retries: u32,
    attempt_timeout: Duration,
}

impl AnchorManager {
    pub fn new(store: Arc<dyn AnchorStore>, max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            store,
            max_retries: max_retries.max(1),
            attempt_timeout,
        }
    }

    /// Publish content to the anchor store, retrying each failed or
    /// timed-out attempt up to the configured bound.
    pub async fn anchor(&self, content: &[u8]) -> Result<AnchorReceipt, ChainError> {
        let content_hash = hash_bytes(content);
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            match tokio::time::timeout(self.attempt_timeout, self.store.put(content)).await {
                Ok(Ok(content_id)) => {
                    let created_at = Utc::now();
                    let anchor_id = derive_anchor_id(&content_id, &content_hash, created_at);
                    info!(anchor_id = %anchor_id, content_id = %content_id, "Anchored content");
                    return Ok(AnchorReceipt {
                        anchor_id,
                        content_id,
                        content_hash,
                        created_at,
                    });
                }
                Ok(Err(err)) => {
                    last_error = err.to_string();
                    warn!(attempt, error = %last_error, "Anchor attempt failed");
                }
                Err(_) => {
                    last_error = format!("attempt timed out after {:?}", self.attempt_timeout);
                    warn!(attempt, "Anchor attempt timed out");
                }
            }
        }

        Err(ChainError::AnchorFailed {
            attempts: self.max_retries,
            reason: last_error,
        })
    }

    /// Retrieve previously anchored content by content id.
    pub async fn retrieve(&self, content_id: &str) -> Result<Option<Vec<u8>>, ChainError> {
        self.store.get(content_id).await
    }
}

fn derive_anchor_id(content_id: &str, content_hash: &str, created_at: DateTime<Utc>) -> String {
    let data = format!(
        "{}{}{}",
        content_id,
        content_hash,
        created_at.timestamp_millis()
    );
    let digest = hash_bytes(data.as_bytes());
    digest.trim_start_matches("sha256:")[..16].to_string()
}
