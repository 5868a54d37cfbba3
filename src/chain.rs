//! Hash-Chain Ledger
//!
//! Appends sealed batches as linked blocks, each referencing the
//! recomputed hash of its predecessor, and verifies end-to-end
//! integrity from genesis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::event::{hash_bytes, ZERO_HASH};

/// A block in the hash chain. The block hash covers every other field
/// in fixed order, so mutating any of them is detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub seq: u64,
    pub prev_hash: String,
    /// Merkle root of the committed batch. Genesis carries no batch.
    pub batch_root: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub block_hash: String,
}

impl Block {
    fn new(seq: u64, prev_hash: String, batch_root: Option<String>) -> Self {
        let mut block = Self {
            seq,
            prev_hash,
            batch_root,
            timestamp: Utc::now(),
            block_hash: String::new(), // Will be calculated
        };
        block.block_hash = block.calculate_hash();
        block
    }

    /// Genesis block: sequence 0, sentinel previous hash, no batch.
    pub fn genesis() -> Self {
        Self::new(0, ZERO_HASH.to_string(), None)
    }

    /// Create canonical string representation for hashing.
    pub fn canonical_string(&self) -> String {
        format!(
            "seq:{}|prev_hash:{}|batch_root:{}|timestamp_ms:{}",
            self.seq,
            self.prev_hash,
            self.batch_root.as_deref().unwrap_or(""),
            self.timestamp.timestamp_millis(),
        )
    }

    /// Recompute this block's hash from its fields.
    pub fn calculate_hash(&self) -> String {
        hash_bytes(self.canonical_string().as_bytes())
    }

    /// Verify the stored hash against a recomputation.
    pub fn verify_hash(&self) -> bool {
        self.block_hash == self.calculate_hash()
    }
}

/// The append-only hash chain. Starts at a genesis block and grows one
/// block per committed batch.
///
/// Chain-mutating calls must be serialized by the caller (the ledger
/// facade holds a writer lock); readers work on cloned snapshots.
#[derive(Debug)]
pub struct HashChain {
    blocks: Vec<Block>,
    /// Index of the first integrity failure, once detected. Appends are
    /// refused while set.
    poisoned: Option<u64>,
}

impl HashChain {
    pub fn new() -> Self {
        let genesis = Block::genesis();
        info!(block_hash = %genesis.block_hash, "Initialized hash chain with genesis block");
        Self {
            blocks: vec![genesis],
            poisoned: None,
        }
    }

    /// Append a new block committing `batch_root`, linked to the current
    /// head's recomputed hash.
    pub fn append(&mut self, batch_root: String) -> Result<&Block, ChainError> {
        if let Some(index) = self.poisoned {
            return Err(ChainError::ChainIntegrity {
                index,
                reason: "chain integrity previously failed; appends are refused".to_string(),
            });
        }

        let head = self.head();
        let block = Block::new(head.seq + 1, head.calculate_hash(), Some(batch_root));
        debug!(seq = block.seq, block_hash = %block.block_hash, "Appended block");
        self.blocks.push(block);
        Ok(self.blocks.last().unwrap())
    }

    pub fn head(&self) -> &Block {
        self.blocks.last().unwrap()
    }

    pub fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn block(&self, seq: u64) -> Option<&Block> {
        self.blocks.get(seq as usize)
    }

    /// Cloned view of the chain for concurrent readers. Committed blocks
    /// never change, so the snapshot stays valid under ongoing writes.
    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    /// Walk the chain from genesis, recomputing every block hash and
    /// checking every link. On failure the chain is poisoned: further
    /// appends are refused until resolved.
    pub fn verify(&mut self) -> Result<(), ChainError> {
        match verify_blocks(&self.blocks) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let ChainError::ChainIntegrity { index, .. } = &err {
                    warn!(index, "Chain integrity failure detected; poisoning chain");
                    self.poisoned = Some(*index);
                }
                Err(err)
            }
        }
    }

    /// Mark the chain poisoned at `index`. Used when a commitment
    /// recorded alongside the chain (a committed batch root) fails
    /// verification; appends are refused from then on.
    pub fn poison(&mut self, index: u64) {
        if self.poisoned.is_none() {
            warn!(index, "Poisoning chain; appends are refused");
            self.poisoned = Some(index);
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}

impl Default for HashChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a block sequence without mutating anything. Reports the first
/// mismatching index: detects insertion, deletion, or mutation.
pub fn verify_blocks(blocks: &[Block]) -> Result<(), ChainError> {
    if blocks.is_empty() {
        return Err(ChainError::ChainIntegrity {
            index: 0,
            reason: "chain has no genesis block".to_string(),
        });
    }

    let genesis = &blocks[0];
    if genesis.seq != 0 || genesis.prev_hash != ZERO_HASH || genesis.batch_root.is_some() {
        return Err(ChainError::ChainIntegrity {
            index: 0,
            reason: "malformed genesis block".to_string(),
        });
    }

    for (i, block) in blocks.iter().enumerate() {
        if block.seq != i as u64 {
            return Err(ChainError::ChainIntegrity {
                index: i as u64,
                reason: format!("expected sequence {}, found {}", i, block.seq),
            });
        }
        if !block.verify_hash() {
            return Err(ChainError::ChainIntegrity {
                index: i as u64,
                reason: "stored block hash does not match recomputation".to_string(),
            });
        }
        if i > 0 {
            let prev = &blocks[i - 1];
            if block.prev_hash != prev.calculate_hash() {
                return Err(ChainError::ChainIntegrity {
                    index: i as u64,
                    reason: format!(
                        "previous-hash link broken: expected {}, got {}",
                        prev.calculate_hash(),
                        block.prev_hash
                    ),
                });
            }
        }
    }

    Ok(())
}
