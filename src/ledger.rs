//! Audit Ledger Facade
//!
//! Owns the batcher, hash chain, and ownership tracker behind a single
//! writer lock. Every chain-mutating operation runs serialized so block
//! sequence numbers and previous-hash links are assigned without races;
//! readers get cloned snapshots of already-committed state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::anchor::{AnchorManager, AnchorReceipt};
use crate::batch::{EventBatcher, SealedBatch};
use crate::chain::{Block, HashChain};
use crate::config::LedgerConfig;
use crate::error::ChainError;
use crate::event::{hash_bytes, AuditEvent};
use crate::merkle::MerkleTree;
use crate::ownership::{OwnershipRecord, OwnershipTracker, OwnershipType};
use crate::verify::VerificationPackage;

/// Actor recorded on events the ledger emits about itself.
const LEDGER_ACTOR: &str = "ledger";

/// A batch committed to the chain, kept for proof generation.
#[derive(Debug, Clone)]
struct CommittedBatch {
    root: String,
    batch: SealedBatch,
}

#[derive(Debug)]
struct LedgerInner {
    batcher: EventBatcher,
    chain: HashChain,
    tracker: OwnershipTracker,
    /// Committed batches keyed by the sequence of their committing block.
    committed: HashMap<u64, CommittedBatch>,
    /// Sealed batches the chain refused to commit. The events and their
    /// batch sequence numbers are preserved for recommit after the
    /// chain is rebuilt from a trusted export.
    staged: Vec<SealedBatch>,
}

/// Receipt for a recorded audit event.
#[derive(Debug, Clone)]
pub struct EventReceipt {
    pub event_id: Uuid,
    pub batch_seq: u64,
    pub position: usize,
    /// Present when this append sealed the batch and committed a block.
    pub committed_block: Option<Block>,
}

/// The audit ledger: append-only hash chain of Merkle-committed event
/// batches plus chain-anchored ownership provenance.
#[derive(Clone)]
pub struct AuditLedger {
    inner: Arc<Mutex<LedgerInner>>,
    config: LedgerConfig,
}

impl AuditLedger {
    pub fn new(config: LedgerConfig) -> Self {
        info!(
            batch_capacity = config.batch_capacity,
            "Initializing audit ledger"
        );
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                batcher: EventBatcher::new(config.batch_capacity),
                chain: HashChain::new(),
                tracker: OwnershipTracker::new(),
                committed: HashMap::new(),
                staged: Vec::new(),
            })),
            config,
        }
    }

    /// Record an audit event produced by any collaborator.
    ///
    /// Auto-seals the open batch at capacity, committing it as a block.
    pub async fn record_event(&self, event: AuditEvent) -> Result<EventReceipt, ChainError> {
        let mut inner = self.inner.lock().await;
        Self::append_locked(&mut inner, event)
    }

    /// Seal the open batch even if partially filled; returns the new
    /// block, or `None` when nothing was buffered.
    pub async fn flush(&self) -> Result<Option<Block>, ChainError> {
        let mut inner = self.inner.lock().await;
        match inner.batcher.flush()? {
            Some(sealed) => Ok(Some(Self::commit_locked(&mut inner, sealed)?)),
            None => Ok(None),
        }
    }

    /// Verify chain linkage plus every committed batch root.
    ///
    /// On failure the chain is poisoned (appends refused) and the
    /// detection itself is noted as an audit event.
    pub async fn verify_chain(&self) -> Result<(), ChainError> {
        let mut inner = self.inner.lock().await;

        let mut result = inner.chain.verify();
        if result.is_ok() {
            result = Self::verify_committed_batches(&inner);
            // A batch-root mismatch is just as fatal as a broken link:
            // the chain must refuse appends until resolved
            if let Err(ChainError::ChainIntegrity { index, .. }) = &result {
                let index = *index;
                inner.chain.poison(index);
            }
        }

        if let Err(err) = &result {
            error!(error = %err, "Chain verification failed");
            let mut metadata = HashMap::new();
            metadata.insert("reason".to_string(), err.to_string());
            Self::note_event(&mut inner, "chain_integrity_failed", metadata);
        }

        result
    }

    /// Register an ownership claim, anchored to the current chain head.
    pub async fn register_ownership(
        &self,
        owner_id: &str,
        asset_id: &str,
        ownership_type: OwnershipType,
        metadata: HashMap<String, String>,
    ) -> Result<OwnershipRecord, ChainError> {
        let mut inner = self.inner.lock().await;
        let block_seq = inner.chain.head().seq;

        let result = inner.tracker.register(
            owner_id.to_string(),
            asset_id.to_string(),
            ownership_type,
            metadata,
            block_seq,
        );

        match &result {
            Ok(record) => {
                let mut meta = ownership_meta(asset_id, owner_id);
                meta.insert("record_id".to_string(), record.record_id.to_string());
                meta.insert(
                    "ownership_type".to_string(),
                    ownership_type.as_str().to_string(),
                );
                let event = AuditEvent::new(
                    LEDGER_ACTOR.to_string(),
                    "ownership_registered".to_string(),
                    record_payload_hash(record)?,
                    meta,
                );
                Self::append_locked(&mut inner, event)?;
            }
            Err(err) => {
                let mut meta = ownership_meta(asset_id, owner_id);
                meta.insert("reason".to_string(), err.to_string());
                Self::note_event(&mut inner, "ownership_register_rejected", meta);
            }
        }

        result
    }

    /// Transfer ownership of an asset.
    ///
    /// Rejected attempts are themselves logged as audit events while no
    /// ownership record is mutated.
    pub async fn transfer_ownership(
        &self,
        asset_id: &str,
        from_owner: &str,
        to_owner: &str,
        metadata: HashMap<String, String>,
    ) -> Result<OwnershipRecord, ChainError> {
        let mut inner = self.inner.lock().await;
        let block_seq = inner.chain.head().seq;

        let result = inner.tracker.transfer(
            asset_id,
            from_owner,
            to_owner.to_string(),
            metadata,
            block_seq,
        );

        match &result {
            Ok(record) => {
                let mut meta = ownership_meta(asset_id, from_owner);
                meta.insert("to_owner".to_string(), to_owner.to_string());
                meta.insert("record_id".to_string(), record.record_id.to_string());
                let event = AuditEvent::new(
                    LEDGER_ACTOR.to_string(),
                    "ownership_transferred".to_string(),
                    record_payload_hash(record)?,
                    meta,
                );
                Self::append_locked(&mut inner, event)?;
            }
            Err(err) => {
                warn!(asset_id, from_owner, to_owner, error = %err, "Ownership transfer rejected");
                let mut meta = ownership_meta(asset_id, from_owner);
                meta.insert("to_owner".to_string(), to_owner.to_string());
                meta.insert("reason".to_string(), err.to_string());
                Self::note_event(&mut inner, "ownership_transfer_rejected", meta);
            }
        }

        result
    }

    /// Full provenance for an asset, oldest to newest.
    pub async fn provenance(&self, asset_id: &str) -> Vec<OwnershipRecord> {
        self.inner.lock().await.tracker.provenance(asset_id)
    }

    /// Latest ownership record for an asset.
    pub async fn current_owner(&self, asset_id: &str) -> Option<OwnershipRecord> {
        self.inner.lock().await.tracker.current_owner(asset_id).cloned()
    }

    /// Cloned snapshot of the chain for concurrent readers.
    pub async fn snapshot(&self) -> Vec<Block> {
        self.inner.lock().await.chain.snapshot()
    }

    pub async fn head(&self) -> Block {
        self.inner.lock().await.chain.head().clone()
    }

    /// Events buffered in the currently open batch.
    pub async fn pending_events(&self) -> usize {
        self.inner.lock().await.batcher.pending()
    }

    /// Sealed batches whose commit was refused and that await recommit.
    pub async fn staged_batches(&self) -> usize {
        self.inner.lock().await.staged.len()
    }

    /// Assemble a verification package for the batch committed at
    /// `block_seq`.
    pub async fn verification_package(
        &self,
        block_seq: u64,
    ) -> Result<VerificationPackage, ChainError> {
        let inner = self.inner.lock().await;
        let block = inner
            .chain
            .block(block_seq)
            .ok_or(ChainError::UnknownBlock(block_seq))?;
        let committed = inner
            .committed
            .get(&block_seq)
            .ok_or(ChainError::UnknownBlock(block_seq))?;
        VerificationPackage::build(block, &committed.batch)
    }

    /// Publish the verification package for `block_seq` to the anchor
    /// store. Decoupled from append: the writer lock is not held across
    /// the store call, and the outcome lands in the audit log either way.
    pub async fn anchor_block(
        &self,
        manager: &AnchorManager,
        block_seq: u64,
    ) -> Result<AnchorReceipt, ChainError> {
        let package = self.verification_package(block_seq).await?;
        let content = serde_json::to_vec(&package)?;

        let result = manager.anchor(&content).await;
        let mut inner = self.inner.lock().await;
        match &result {
            Ok(receipt) => {
                let mut meta = HashMap::new();
                meta.insert("block_seq".to_string(), block_seq.to_string());
                meta.insert("anchor_id".to_string(), receipt.anchor_id.clone());
                meta.insert("content_id".to_string(), receipt.content_id.clone());
                let event = AuditEvent::new(
                    LEDGER_ACTOR.to_string(),
                    "anchor_committed".to_string(),
                    receipt.content_hash.clone(),
                    meta,
                );
                Self::append_locked(&mut inner, event)?;
            }
            Err(err) => {
                let mut meta = HashMap::new();
                meta.insert("block_seq".to_string(), block_seq.to_string());
                meta.insert("reason".to_string(), err.to_string());
                Self::note_event(&mut inner, "anchor_failed", meta);
            }
        }

        result
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Recompute each committed batch's Merkle root against the root
    /// recorded in its block, in ascending block order so the first
    /// mismatching index is reported deterministically.
    fn verify_committed_batches(inner: &LedgerInner) -> Result<(), ChainError> {
        let mut block_seqs: Vec<u64> = inner.committed.keys().copied().collect();
        block_seqs.sort_unstable();

        for block_seq in block_seqs {
            let committed = &inner.committed[&block_seq];
            let tree = MerkleTree::build(&committed.batch.leaf_hashes)?;
            if tree.root() != committed.root {
                return Err(ChainError::ChainIntegrity {
                    index: block_seq,
                    reason: format!(
                        "batch root mismatch for block {}: recorded {}, recomputed {}",
                        block_seq,
                        committed.root,
                        tree.root()
                    ),
                });
            }
        }
        Ok(())
    }

    fn append_locked(
        inner: &mut LedgerInner,
        event: AuditEvent,
    ) -> Result<EventReceipt, ChainError> {
        let event_id = event.id;
        let outcome = inner.batcher.append(event)?;

        let committed_block = match outcome.sealed {
            Some(sealed) => Some(Self::commit_locked(inner, sealed)?),
            None => None,
        };

        Ok(EventReceipt {
            event_id,
            batch_seq: outcome.batch_seq,
            position: outcome.position,
            committed_block,
        })
    }

    /// Build the Merkle commitment for a sealed batch and append the
    /// committing block. Exactly one caller runs this per batch.
    fn commit_locked(inner: &mut LedgerInner, sealed: SealedBatch) -> Result<Block, ChainError> {
        let tree = MerkleTree::build(&sealed.leaf_hashes)?;
        let root = tree.root().to_string();

        let block = match inner.chain.append(root.clone()) {
            Ok(block) => block.clone(),
            Err(err) => {
                // Receipts were already issued for these events; keep
                // the sealed batch so it can be recommitted once the
                // chain is restored from a trusted export.
                warn!(
                    batch_seq = sealed.seq,
                    events = sealed.len(),
                    "Chain refused commit; staging sealed batch"
                );
                inner.staged.push(sealed);
                return Err(err);
            }
        };
        debug!(
            block_seq = block.seq,
            batch_seq = sealed.seq,
            events = sealed.len(),
            "Committed batch to chain"
        );
        inner.committed.insert(
            block.seq,
            CommittedBatch {
                root,
                batch: sealed,
            },
        );
        Ok(block)
    }

    /// Best-effort audit note for a rejection path. A failure to record
    /// the note never masks the original error.
    fn note_event(inner: &mut LedgerInner, event_type: &str, metadata: HashMap<String, String>) {
        let payload = metadata
            .get("reason")
            .cloned()
            .unwrap_or_else(|| event_type.to_string());
        let event = AuditEvent::new(
            LEDGER_ACTOR.to_string(),
            event_type.to_string(),
            hash_bytes(payload.as_bytes()),
            metadata,
        );
        if let Err(err) = Self::append_locked(inner, event) {
            warn!(event_type, error = %err, "Failed to record audit note");
        }
    }
}

fn ownership_meta(asset_id: &str, owner_id: &str) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    meta.insert("asset_id".to_string(), asset_id.to_string());
    meta.insert("owner_id".to_string(), owner_id.to_string());
    meta
}

fn record_payload_hash(record: &OwnershipRecord) -> Result<String, ChainError> {
    let bytes = serde_json::to_vec(record)?;
    Ok(hash_bytes(&bytes))
}
