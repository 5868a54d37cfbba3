//! Chain Verification
//!
//! Assembles externally consumable verification packages and provides
//! detailed whole-chain verification plus JSONL export/load for
//! offline inspection.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::batch::SealedBatch;
use crate::chain::{verify_blocks, Block};
use crate::error::ChainError;
use crate::merkle::{MerkleProof, MerkleTree};

/// Self-contained bundle letting an external party recompute a batch
/// root from raw events (retrieved from the anchor store) and compare
/// it against the chain's recorded commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationPackage {
    pub batch_seq: u64,
    pub batch_root: String,
    pub block_seq: u64,
    pub block_hash: String,
    /// Position of the committing block within the chain.
    pub chain_position: u64,
    pub event_count: usize,
    /// Proofs for representative leaves: first, middle, and last.
    pub sample_proofs: Vec<MerkleProof>,
}

impl VerificationPackage {
    /// Assemble a package for a sealed batch and the block committing it.
    pub fn build(block: &Block, batch: &SealedBatch) -> Result<Self, ChainError> {
        let batch_root = block
            .batch_root
            .clone()
            .ok_or_else(|| ChainError::UnknownBlock(block.seq))?;

        let tree = MerkleTree::build(&batch.leaf_hashes)?;
        if tree.root() != batch_root {
            return Err(ChainError::ChainIntegrity {
                index: block.seq,
                reason: format!(
                    "recorded batch root {} does not match recomputed {}",
                    batch_root,
                    tree.root()
                ),
            });
        }

        let mut indices = vec![0, batch.len() / 2, batch.len() - 1];
        indices.dedup();
        let sample_proofs = indices
            .into_iter()
            .map(|i| tree.proof(i))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(block_seq = block.seq, proofs = sample_proofs.len(), "Built verification package");
        Ok(Self {
            batch_seq: batch.seq,
            batch_root,
            block_seq: block.seq,
            block_hash: block.block_hash.clone(),
            chain_position: block.seq,
            event_count: batch.len(),
            sample_proofs,
        })
    }

    /// Check every sample proof against the recorded batch root.
    pub fn verify_samples(&self) -> Result<(), ChainError> {
        for proof in &self.sample_proofs {
            if !proof.verify(&self.batch_root) {
                return Err(ChainError::ProofMismatch {
                    leaf_index: proof.leaf_index,
                });
            }
        }
        Ok(())
    }
}

/// Detailed result of verifying an entire chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub block_count: usize,
    pub first_invalid: Option<u64>,
    pub error_message: Option<String>,
}

impl ChainVerification {
    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.is_valid {
            format!("Chain is valid ({} blocks)", self.block_count)
        } else {
            format!(
                "Chain is INVALID at block {}: {}",
                self.first_invalid.unwrap_or(0),
                self.error_message.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// Verify a block sequence and return a detailed report instead of an error.
pub fn verify_chain_detailed(blocks: &[Block]) -> ChainVerification {
    match verify_blocks(blocks) {
        Ok(()) => {
            info!(blocks = blocks.len(), "Chain verification successful");
            ChainVerification {
                is_valid: true,
                block_count: blocks.len(),
                first_invalid: None,
                error_message: None,
            }
        }
        Err(err) => {
            let first_invalid = match &err {
                ChainError::ChainIntegrity { index, .. } => Some(*index),
                _ => None,
            };
            ChainVerification {
                is_valid: false,
                block_count: blocks.len(),
                first_invalid,
                error_message: Some(err.to_string()),
            }
        }
    }
}

/// Export a chain snapshot as JSONL, one block per line.
pub fn save_chain_to_file(blocks: &[Block], path: &Path) -> Result<(), ChainError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    for block in blocks {
        let json = serde_json::to_string(block)?;
        writeln!(file, "{}", json)?;
    }
    info!(blocks = blocks.len(), path = %path.display(), "Exported chain");
    Ok(())
}

/// Load a JSONL chain export.
pub fn load_chain_from_file(path: &Path) -> Result<Vec<Block>, ChainError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut blocks = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let block: Block = serde_json::from_str(&line)?;
        blocks.push(block);
    }

    debug!(blocks = blocks.len(), path = %path.display(), "Loaded chain export");
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::EventBatcher;
    use crate::chain::HashChain;
    use crate::event::{AuditEvent, ZERO_HASH};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn committed_batch(n: usize) -> (HashChain, SealedBatch) {
        let mut batcher = EventBatcher::new(n);
        let mut sealed = None;
        for i in 0..n {
            let event = AuditEvent::new(
                "tester".to_string(),
                format!("event_{}", i),
                ZERO_HASH.to_string(),
                HashMap::new(),
            );
            if let Some(s) = batcher.append(event).unwrap().sealed {
                sealed = Some(s);
            }
        }
        let sealed = sealed.unwrap();
        let tree = MerkleTree::build(&sealed.leaf_hashes).unwrap();
        let mut chain = HashChain::new();
        chain.append(tree.root().to_string()).unwrap();
        (chain, sealed)
    }

    #[test]
    fn test_package_assembly_and_sample_proofs() {
        let (chain, sealed) = committed_batch(5);
        let block = chain.block(1).unwrap();

        let package = VerificationPackage::build(block, &sealed).unwrap();
        assert_eq!(package.chain_position, 1);
        assert_eq!(package.event_count, 5);
        assert_eq!(package.sample_proofs.len(), 3);
        package.verify_samples().unwrap();
    }

    #[test]
    fn test_package_for_single_event_batch() {
        let (chain, sealed) = committed_batch(1);
        let block = chain.block(1).unwrap();

        let package = VerificationPackage::build(block, &sealed).unwrap();
        assert_eq!(package.sample_proofs.len(), 1);
        assert_eq!(package.batch_root, sealed.leaf_hashes[0]);
        package.verify_samples().unwrap();
    }

    #[test]
    fn test_package_rejects_root_mismatch() {
        let (chain, mut sealed) = committed_batch(4);
        let block = chain.block(1).unwrap();
        sealed.leaf_hashes[0] = ZERO_HASH.to_string();

        let err = VerificationPackage::build(block, &sealed).unwrap_err();
        assert!(matches!(err, ChainError::ChainIntegrity { .. }));
    }

    #[test]
    fn test_detailed_verification_reports_first_invalid() {
        let (chain, _) = committed_batch(3);
        let mut blocks = chain.snapshot();

        assert!(verify_chain_detailed(&blocks).is_valid);

        blocks[1].batch_root = Some(ZERO_HASH.to_string());
        let report = verify_chain_detailed(&blocks);
        assert!(!report.is_valid);
        assert_eq!(report.first_invalid, Some(1));
        assert!(report.summary().contains("INVALID"));
    }

    #[test]
    fn test_chain_file_round_trip() {
        let (chain, _) = committed_batch(2);
        let blocks = chain.snapshot();

        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.jsonl");
        save_chain_to_file(&blocks, &path).unwrap();

        let loaded = load_chain_from_file(&path).unwrap();
        assert_eq!(loaded.len(), blocks.len());
        assert!(verify_chain_detailed(&loaded).is_valid);
        assert_eq!(loaded[1].block_hash, blocks[1].block_hash);
    }
}
