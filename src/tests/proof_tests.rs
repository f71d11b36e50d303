// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::TEST_KEY;
use crate::keys::AgentKey;
use crate::proof::{content_hash, model_hash, proof_digest, ProofGenerator};
use alloy::primitives::{b256, Address, B256};
use std::sync::Arc;

const MODEL: &str = "bigscience/bloom-560m";

fn generator(capacity: usize) -> ProofGenerator {
    let key = Arc::new(AgentKey::from_hex(TEST_KEY).unwrap());
    ProofGenerator::with_capacity(key, MODEL, capacity)
}

#[test]
fn test_digest_golden_vector() {
    // Fixed vector: must never change across releases or machines.
    let agent: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
    let m = model_hash(MODEL);
    let i = content_hash(b"hello");
    let o = content_hash(b"world");

    assert_eq!(m, b256!("af2c5449ea52d1ba91cac0d70fece95b4e6998ffd32b8ad0ca5e6ac4a3c8a888"));
    assert_eq!(i, b256!("1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"));
    assert_eq!(
        proof_digest(&m, &i, &o, &agent),
        b256!("d84d4866467982304bb9f7b9c381f3b130b27eaa01f8cb9b24ca4a464fe4b59f")
    );
}

#[test]
fn test_digest_depends_on_every_input() {
    let agent = Address::repeat_byte(0x11);
    let base = proof_digest(&B256::ZERO, &B256::ZERO, &B256::ZERO, &agent);
    let h = B256::repeat_byte(1);

    assert_ne!(base, proof_digest(&h, &B256::ZERO, &B256::ZERO, &agent));
    assert_ne!(base, proof_digest(&B256::ZERO, &h, &B256::ZERO, &agent));
    assert_ne!(base, proof_digest(&B256::ZERO, &B256::ZERO, &h, &agent));
    assert_ne!(base, proof_digest(&B256::ZERO, &B256::ZERO, &B256::ZERO, &Address::repeat_byte(0x12)));
}

#[test]
fn test_generate_is_independent_of_order_and_instance() {
    let a = generator(16);
    let b = generator(16);

    let first = a.generate_for_inference(b"in-1", b"out-1", 4).unwrap();
    let _ = a.generate_for_inference(b"in-2", b"out-2", 4).unwrap();

    let _ = b.generate_for_inference(b"in-2", b"out-2", 4).unwrap();
    let again = b.generate_for_inference(b"in-1", b"out-1", 4).unwrap();

    assert_eq!(first.digest, again.digest);
    assert_eq!(first.signature, again.signature);
}

#[test]
fn test_generated_proof_verifies() {
    let g = generator(16);
    let record = g.generate_for_inference(b"prompt", b"completion", 12).unwrap();

    assert_eq!(record.agent_address, g.agent());
    assert_eq!(record.model_hash, g.model_hash());
    assert!(record.digest_matches());
    assert!(record.signature_matches().unwrap());

    let mut tampered = record.clone();
    tampered.output_hash = content_hash(b"something else");
    assert!(!tampered.digest_matches());
}

#[test]
fn test_queue_flow_pending_to_ready() {
    let g = generator(100);
    for n in 0..5u64 {
        g.generate_for_inference(&n.to_le_bytes(), b"out", n).unwrap();
    }
    assert_eq!(g.pending_len(), 5);

    let batch = g.drain_batch(3);
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].token_count, 0);
    assert_eq!(g.pending_len(), 2);

    g.stage_for_report(batch);
    assert_eq!(g.ready_len(), 3);

    let taken = g.take_ready(10);
    assert_eq!(taken.len(), 3);
    assert_eq!(g.ready_len(), 0);
}

#[test]
fn test_requeue_goes_ahead_of_newer_proofs() {
    let g = generator(100);
    for n in 0..4u64 {
        g.generate_for_inference(&n.to_le_bytes(), b"out", n).unwrap();
    }
    let batch = g.drain_batch(4);
    g.stage_for_report(batch);

    let failed = g.take_ready(2); // tokens 0, 1
    g.requeue_ready(failed);

    let order: Vec<u64> = g.take_ready(10).iter().map(|p| p.token_count).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn test_bounded_queue_drops_oldest() {
    let g = generator(3);
    for n in 0..5u64 {
        g.generate_for_inference(&n.to_le_bytes(), b"out", n).unwrap();
    }
    assert_eq!(g.pending_len(), 3);
    assert_eq!(g.dropped(), 2);

    let kept: Vec<u64> = g.drain_batch(10).iter().map(|p| p.token_count).collect();
    assert_eq!(kept, vec![2, 3, 4]);
}
