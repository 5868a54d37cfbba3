//! Ownership/Provenance Tracker
//!
//! Records ownership claims and transfers as chain-anchored, append-only
//! history per asset. Records are never mutated or deleted; a transfer
//! creates a new record pointing to its predecessor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ChainError;

/// Types of ownership claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipType {
    Creator,
    Contributor,
    Maintainer,
    IntellectualProperty,
}

impl OwnershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Contributor => "contributor",
            Self::Maintainer => "maintainer",
            Self::IntellectualProperty => "intellectual_property",
        }
    }
}

/// A single ownership claim, anchored to the chain position it was
/// registered at and linked to its predecessor for the same asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub record_id: Uuid,
    pub owner_id: String,
    pub asset_id: String,
    pub ownership_type: OwnershipType,
    /// Sequence of the chain head at registration time.
    pub block_seq: u64,
    pub timestamp: DateTime<Utc>,
    /// Predecessor record for the same asset, or `None` for the first claim.
    pub prev_record: Option<Uuid>,
    pub metadata: HashMap<String, String>,
}

/// Tracks append-only ownership histories keyed by asset.
///
/// Mutating calls are serialized by the ledger facade alongside chain
/// appends, so block anchors and predecessor links are race-free.
#[derive(Debug, Default)]
pub struct OwnershipTracker {
    records: HashMap<Uuid, OwnershipRecord>,
    /// Latest record per asset; history is reached via `prev_record` links.
    heads: HashMap<String, Uuid>,
}

impl OwnershipTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ownership claim for an asset.
    ///
    /// The first claim has no predecessor; subsequent claims link to the
    /// asset's current head record.
    pub fn register(
        &mut self,
        owner_id: String,
        asset_id: String,
        ownership_type: OwnershipType,
        metadata: HashMap<String, String>,
        block_seq: u64,
    ) -> Result<OwnershipRecord, ChainError> {
        if owner_id.trim().is_empty() || asset_id.trim().is_empty() {
            return Err(ChainError::InvalidEvent(
                "owner id and asset id must not be empty".to_string(),
            ));
        }

        let record = OwnershipRecord {
            record_id: Uuid::new_v4(),
            owner_id,
            asset_id: asset_id.clone(),
            ownership_type,
            block_seq,
            timestamp: Utc::now(),
            prev_record: self.heads.get(&asset_id).copied(),
            metadata,
        };

        info!(
            asset_id = %record.asset_id,
            owner_id = %record.owner_id,
            block_seq,
            "Registered ownership claim"
        );

        self.heads.insert(asset_id, record.record_id);
        self.records.insert(record.record_id, record.clone());
        Ok(record)
    }

    /// Transfer ownership of an asset.
    ///
    /// Succeeds only if `from_owner` matches the current recorded owner;
    /// on mismatch nothing is mutated and the caller is expected to log
    /// the rejected attempt as an audit event.
    pub fn transfer(
        &mut self,
        asset_id: &str,
        from_owner: &str,
        to_owner: String,
        metadata: HashMap<String, String>,
        block_seq: u64,
    ) -> Result<OwnershipRecord, ChainError> {
        let current = self
            .current_owner(asset_id)
            .ok_or_else(|| ChainError::UnknownAsset(asset_id.to_string()))?;

        if current.owner_id != from_owner {
            return Err(ChainError::UnauthorizedTransfer {
                asset_id: asset_id.to_string(),
                claimed: from_owner.to_string(),
                actual: current.owner_id.clone(),
            });
        }

        let ownership_type = current.ownership_type;
        debug!(asset_id, from_owner, to_owner = %to_owner, "Transferring ownership");
        self.register(
            to_owner,
            asset_id.to_string(),
            ownership_type,
            metadata,
            block_seq,
        )
    }

    /// The latest ownership record for an asset, if registered.
    pub fn current_owner(&self, asset_id: &str) -> Option<&OwnershipRecord> {
        self.heads
            .get(asset_id)
            .and_then(|id| self.records.get(id))
    }

    /// Full provenance for an asset, oldest to newest, by walking
    /// predecessor links in reverse.
    pub fn provenance(&self, asset_id: &str) -> Vec<OwnershipRecord> {
        let mut history = Vec::new();
        let mut cursor = self.heads.get(asset_id).copied();
        while let Some(id) = cursor {
            let record = &self.records[&id];
            history.push(record.clone());
            cursor = record.prev_record;
        }
        history.reverse();
        history
    }

    pub fn asset_count(&self) -> usize {
        self.heads.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
