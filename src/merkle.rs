//! Merkle Tree for Sealed Batches
//!
//! Commits a sealed batch's ordered leaf hashes into a single root and
//! produces per-leaf proof paths verifiable in O(log n).
//!
//! Odd levels duplicate the last node and pair it with itself; the rule
//! is applied identically during construction and proof generation, so
//! every generated proof verifies against the stored root.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::ChainError;

/// Which side of the combination a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of a proof path: the sibling hash and its side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Merkle proof for a single leaf, ordered leaf to root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: String,
    pub leaf_index: usize,
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Verify this proof against a root.
    pub fn verify(&self, root: &str) -> bool {
        verify_proof(&self.leaf_hash, self, root)
    }

    /// Proof size in hashes.
    pub fn size(&self) -> usize {
        self.path.len()
    }
}

/// Combine two node hashes into their parent hash.
fn combine(left: &str, right: &str) -> String {
    let combined = format!("{}{}", left, right);
    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Merkle tree built over a sealed batch's leaf hashes.
///
/// All levels are retained (leaves first, root last) so proof paths can
/// be read off directly.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
}

impl MerkleTree {
    /// Build a tree from ordered leaf hashes (length >= 1).
    ///
    /// A single-leaf batch has the leaf hash as its root.
    pub fn build(leaves: &[String]) -> Result<Self, ChainError> {
        if leaves.is_empty() {
            return Err(ChainError::EmptyBatch);
        }

        let mut levels = vec![leaves.to_vec()];
        while levels.last().unwrap().len() > 1 {
            let current = levels.last().unwrap();
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                match pair {
                    [left, right] => next.push(combine(left, right)),
                    // Odd node count: duplicate the last node
                    [last] => next.push(combine(last, last)),
                    _ => unreachable!(),
                }
            }
            levels.push(next);
        }

        let tree = Self { levels };
        debug!(leaves = leaves.len(), root = %tree.root(), "Built Merkle tree");
        Ok(tree)
    }

    /// The root hash committing to the entire ordered leaf set.
    pub fn root(&self) -> &str {
        &self.levels.last().unwrap()[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels, leaves through root.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Generate the proof path for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, ChainError> {
        let leaf_count = self.leaf_count();
        if index >= leaf_count {
            return Err(ChainError::LeafIndexOutOfRange {
                index,
                len: leaf_count,
            });
        }

        let mut path = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_idx, side) = if idx % 2 == 0 {
                (idx + 1, Side::Right)
            } else {
                (idx - 1, Side::Left)
            };
            // The duplicated last node is its own right sibling
            let sibling = if sibling_idx < level.len() {
                level[sibling_idx].clone()
            } else {
                level[idx].clone()
            };
            path.push(ProofStep { sibling, side });
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: self.levels[0][index].clone(),
            leaf_index: index,
            path,
        })
    }
}

/// Verify a leaf against a root using a proof path.
///
/// Deterministic, no side effects, O(log n) in batch size.
pub fn verify_proof(leaf_hash: &str, proof: &MerkleProof, root: &str) -> bool {
    let mut current = leaf_hash.to_string();
    for step in &proof.path {
        current = match step.side {
            Side::Left => combine(&step.sibling, &current),
            Side::Right => combine(&current, &step.sibling),
        };
    }
    current == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::hash_bytes;

    fn leaves(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| hash_bytes(format!("leaf-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaves = leaves(1);
        let tree = MerkleTree::build(&leaves).unwrap();
        assert_eq!(tree.root(), leaves[0]);

        let proof = tree.proof(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.verify(tree.root()));
    }

    #[test]
    fn test_empty_leaves_rejected() {
        assert!(matches!(
            MerkleTree::build(&[]),
            Err(ChainError::EmptyBatch)
        ));
    }

    #[test]
    fn test_deterministic_root() {
        let leaves = leaves(7);
        let a = MerkleTree::build(&leaves).unwrap();
        let b = MerkleTree::build(&leaves).unwrap();
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_five_leaves_three_combination_levels() {
        // 5 -> 3 -> 2 -> 1: three combination levels via last-node duplication
        let tree = MerkleTree::build(&leaves(5)).unwrap();
        assert_eq!(tree.depth(), 4);
        let proof = tree.proof(4).unwrap();
        assert_eq!(proof.size(), 3);
        assert!(proof.verify(tree.root()));
    }

    #[test]
    fn test_all_proofs_verify_for_sizes_1_to_8() {
        for n in 1..=8 {
            let leaves = leaves(n);
            let tree = MerkleTree::build(&leaves).unwrap();
            for i in 0..n {
                let proof = tree.proof(i).unwrap();
                assert!(
                    verify_proof(&leaves[i], &proof, tree.root()),
                    "proof failed for leaf {} of {}",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_tampered_sibling_fails_verification() {
        let leaves = leaves(6);
        let tree = MerkleTree::build(&leaves).unwrap();
        let mut proof = tree.proof(2).unwrap();

        // Flip a single nibble in the first sibling hash
        let original = proof.path[0].sibling.clone();
        let mut bytes = original.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'0' { b'1' } else { b'0' };
        proof.path[0].sibling = String::from_utf8(bytes).unwrap();

        assert!(!verify_proof(&leaves[2], &proof, tree.root()));
    }

    #[test]
    fn test_wrong_leaf_fails_verification() {
        let leaves = leaves(4);
        let tree = MerkleTree::build(&leaves).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!verify_proof(&leaves[2], &proof, tree.root()));
    }

    #[test]
    fn test_proof_index_out_of_range() {
        let tree = MerkleTree::build(&leaves(3)).unwrap();
        assert!(matches!(
            tree.proof(3),
            Err(ChainError::LeafIndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_duplicated_node_proof_verifies() {
        // Leaf 2 of 3 pairs with itself at the first level
        let leaves = leaves(3);
        let tree = MerkleTree::build(&leaves).unwrap();
        let proof = tree.proof(2).unwrap();
        assert_eq!(proof.path[0].sibling, leaves[2]);
        assert_eq!(proof.path[0].side, Side::Right);
        assert!(proof.verify(tree.root()));
    }
}
