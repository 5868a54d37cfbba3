//! Tamper-evident audit trail: an append-only hash chain of sealed
//! event batches, each committed via a Merkle tree, plus an ownership
//! provenance tracker anchored to chain positions.

pub mod anchor;
pub mod batch;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod merkle;
pub mod ownership;
pub mod verify;

pub use anchor::{AnchorManager, AnchorReceipt, AnchorStore, MemoryAnchorStore};
pub use batch::{EventBatcher, SealedBatch};
pub use chain::{Block, HashChain};
pub use config::LedgerConfig;
pub use error::ChainError;
pub use event::AuditEvent;
pub use ledger::AuditLedger;
pub use merkle::{verify_proof, MerkleProof, MerkleTree};
pub use ownership::{OwnershipRecord, OwnershipTracker, OwnershipType};
pub use verify::{verify_chain_detailed, ChainVerification, VerificationPackage};
