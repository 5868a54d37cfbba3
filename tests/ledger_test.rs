//! Audit Ledger Integration Tests
//!
//! End-to-end exercises of the event batcher, Merkle commitments,
//! hash-chain ledger, ownership tracker, and anchor hand-off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use audit_chain::anchor::{AnchorManager, MemoryAnchorStore};
use audit_chain::chain::verify_blocks;
use audit_chain::event::{hash_bytes, AuditEvent, ZERO_HASH};
use audit_chain::merkle::MerkleTree;
use audit_chain::ownership::OwnershipType;
use audit_chain::verify::{load_chain_from_file, save_chain_to_file, verify_chain_detailed};
use audit_chain::{AuditLedger, ChainError, LedgerConfig};

fn ledger(capacity: usize) -> AuditLedger {
    AuditLedger::new(LedgerConfig {
        batch_capacity: capacity,
        ..LedgerConfig::default()
    })
}

fn event(actor: &str, event_type: &str) -> AuditEvent {
    AuditEvent::new(
        actor.to_string(),
        event_type.to_string(),
        ZERO_HASH.to_string(),
        HashMap::new(),
    )
}

#[tokio::test]
async fn test_end_to_end_commit_and_verify() -> Result<(), ChainError> {
    let ledger = ledger(5);

    // Three full batches of five events each
    for i in 0..15 {
        ledger.record_event(event("producer", &format!("op_{}", i))).await?;
    }

    let blocks = ledger.snapshot().await;
    assert_eq!(blocks.len(), 4); // genesis + 3 committed batches
    ledger.verify_chain().await?;

    // Every committed block carries a recomputable batch root
    for block in &blocks[1..] {
        assert!(block.batch_root.is_some());
        let package = ledger.verification_package(block.seq).await?;
        assert_eq!(package.block_hash, block.block_hash);
        package.verify_samples()?;
    }

    Ok(())
}

#[tokio::test]
async fn test_genesis_and_link_properties() {
    let ledger = ledger(1);
    ledger.record_event(event("producer", "first")).await.unwrap();

    let blocks = ledger.snapshot().await;
    let genesis = &blocks[0];
    assert_eq!(genesis.seq, 0);
    assert_eq!(genesis.prev_hash, ZERO_HASH);
    assert!(genesis.batch_root.is_none());

    // The next block's prev_hash equals the recomputed genesis hash
    assert_eq!(blocks[1].prev_hash, genesis.calculate_hash());
}

#[tokio::test]
async fn test_tampered_snapshot_detected() {
    let ledger = ledger(2);
    for i in 0..6 {
        ledger.record_event(event("producer", &format!("op_{}", i))).await.unwrap();
    }

    let mut blocks = ledger.snapshot().await;
    assert!(verify_blocks(&blocks).is_ok());

    // Mutating any single field of any stored block is detected
    blocks[2].batch_root = Some(hash_bytes(b"forged root"));
    let err = verify_blocks(&blocks).unwrap_err();
    assert!(matches!(err, ChainError::ChainIntegrity { index: 2, .. }));
}

#[tokio::test]
async fn test_ownership_scenario() {
    let ledger = ledger(100);

    // Register ownership of asset A1 to alice
    let record = ledger
        .register_ownership("alice", "A1", OwnershipType::Creator, HashMap::new())
        .await
        .unwrap();
    assert!(record.prev_record.is_none());

    // Attempt transfer by bob: fails, provenance unchanged
    let err = ledger
        .transfer_ownership("A1", "bob", "mallory", HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::UnauthorizedTransfer { .. }));

    let history = ledger.provenance("A1").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].owner_id, "alice");

    // Legitimate transfer chain; provenance strictly ordered by block seq
    ledger.flush().await.unwrap();
    ledger
        .transfer_ownership("A1", "alice", "bob", HashMap::new())
        .await
        .unwrap();
    ledger.flush().await.unwrap();
    ledger
        .transfer_ownership("A1", "bob", "carol", HashMap::new())
        .await
        .unwrap();

    let history = ledger.provenance("A1").await;
    let owners: Vec<&str> = history.iter().map(|r| r.owner_id.as_str()).collect();
    assert_eq!(owners, vec!["alice", "bob", "carol"]);
    for pair in history.windows(2) {
        assert!(pair[0].block_seq < pair[1].block_seq);
    }

    assert_eq!(ledger.current_owner("A1").await.unwrap().owner_id, "carol");
    ledger.verify_chain().await.unwrap();
}

#[tokio::test]
async fn test_five_event_batch_tree_shape() {
    let ledger = ledger(5);
    let mut committed = None;
    for i in 0..5 {
        let receipt = ledger.record_event(event("producer", &format!("op_{}", i))).await.unwrap();
        if receipt.committed_block.is_some() {
            committed = receipt.committed_block;
        }
    }
    let block = committed.expect("fifth event commits the batch");

    let package = ledger.verification_package(block.seq).await.unwrap();
    assert_eq!(package.event_count, 5);
    // 5 leaves need three combination steps via last-node duplication
    for proof in &package.sample_proofs {
        assert_eq!(proof.size(), 3);
    }
    package.verify_samples().unwrap();
}

#[tokio::test]
async fn test_anchor_round_trip_reproduces_root() {
    let ledger = ledger(4);
    for i in 0..4 {
        ledger.record_event(event("producer", &format!("op_{}", i))).await.unwrap();
    }

    let store = Arc::new(MemoryAnchorStore::new());
    let manager = AnchorManager::new(store, 3, Duration::from_secs(5));

    let receipt = ledger.anchor_block(&manager, 1).await.unwrap();

    // An external party retrieves the package and independently
    // recomputes the root from the recorded proofs
    let content = manager
        .retrieve(&receipt.content_id)
        .await
        .unwrap()
        .expect("anchored content retrievable");
    let package: audit_chain::VerificationPackage = serde_json::from_slice(&content).unwrap();

    assert_eq!(package.chain_position, 1);
    package.verify_samples().unwrap();

    let head_block = ledger.snapshot().await[1].clone();
    assert_eq!(package.batch_root, head_block.batch_root.unwrap());

    // The anchoring outcome was itself recorded as an audit event
    assert_eq!(ledger.pending_events().await, 1);
}

#[tokio::test]
async fn test_batch_roots_match_recomputation() {
    let ledger = ledger(3);
    for i in 0..9 {
        ledger.record_event(event("producer", &format!("op_{}", i))).await.unwrap();
    }

    for seq in 1..=3u64 {
        let package = ledger.verification_package(seq).await.unwrap();
        // The recorded root must verify every sample proof
        for proof in &package.sample_proofs {
            assert!(proof.verify(&package.batch_root));
        }
    }
}

#[tokio::test]
async fn test_chain_export_round_trip() {
    let ledger = ledger(2);
    for i in 0..4 {
        ledger.record_event(event("producer", &format!("op_{}", i))).await.unwrap();
    }

    let blocks = ledger.snapshot().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.jsonl");

    save_chain_to_file(&blocks, &path).unwrap();
    let loaded = load_chain_from_file(&path).unwrap();

    let report = verify_chain_detailed(&loaded);
    assert!(report.is_valid);
    assert_eq!(report.block_count, blocks.len());

    // Tamper with the export on disk and confirm detection
    let mut tampered = loaded.clone();
    tampered.remove(1);
    let report = verify_chain_detailed(&tampered);
    assert!(!report.is_valid);
    assert_eq!(report.first_invalid, Some(1));
}

#[tokio::test]
async fn test_same_input_yields_same_root_across_runs() {
    // Identical ordered leaf hashes always commit to the same root
    let leaves: Vec<String> = (0..5)
        .map(|i| hash_bytes(format!("stable-leaf-{}", i).as_bytes()))
        .collect();

    let first = MerkleTree::build(&leaves).unwrap().root().to_string();
    let second = MerkleTree::build(&leaves).unwrap().root().to_string();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_producers() {
    let ledger = ledger(10);
    let mut handles = Vec::new();
    for t in 0..4 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                ledger
                    .record_event(event(&format!("producer-{}", t), &format!("op_{}", i)))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // 100 events at capacity 10: ten committed blocks, nothing pending
    let blocks = ledger.snapshot().await;
    assert_eq!(blocks.len(), 11);
    assert_eq!(ledger.pending_events().await, 0);
    ledger.verify_chain().await.unwrap();
}
