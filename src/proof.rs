// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Inference Proofs
//!
//! A proof binds one inference (model, input, output) to the agent that ran it:
//!
//! ```text
//! digest = keccak256(modelHash || inputHash || outputHash || pad32(agent))
//! ```
//!
//! The digest is then `personal_sign`ed with the agent key.
//!
//! # Queues
//! - `pending`: freshly generated, waiting for the proof-submission cycle
//! - `ready`: passed the submission cycle, waiting to ride on the next report
//!
//! Both queues are bounded; overflow discards the oldest record.
//!
//! # Guarantee
//! Same (model, input, output, agent) → same digest, on any machine, in any order.

use alloy::primitives::{keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::KernelResult;
use crate::keys::{recover_message_signer, signature_to_hex, AgentKey};
use crate::metrics::unix_secs;

/// Default bound on each proof queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub model_hash: B256,
    pub input_hash: B256,
    pub output_hash: B256,
    pub agent_address: Address,
    pub token_count: u64,
    #[serde(rename = "proofHash")]
    pub digest: B256,
    pub signature: String,
    pub timestamp: u64,
}

impl ProofRecord {
    /// Recompute the digest from the recorded hashes.
    pub fn digest_matches(&self) -> bool {
        proof_digest(&self.model_hash, &self.input_hash, &self.output_hash, &self.agent_address)
            == self.digest
    }

    /// Check the signature over the digest recovers to `agent_address`.
    pub fn signature_matches(&self) -> KernelResult<bool> {
        let signer = recover_message_signer(self.digest.as_slice(), &self.signature)?;
        Ok(signer == self.agent_address)
    }
}

pub fn model_hash(model_name: &str) -> B256 {
    keccak256(model_name.as_bytes())
}

pub fn content_hash(data: &[u8]) -> B256 {
    keccak256(data)
}

/// keccak256(modelHash || inputHash || outputHash || agent left-padded to 32 bytes).
pub fn proof_digest(model_hash: &B256, input_hash: &B256, output_hash: &B256, agent: &Address) -> B256 {
    let mut buf = [0u8; 128];
    buf[0..32].copy_from_slice(model_hash.as_slice());
    buf[32..64].copy_from_slice(input_hash.as_slice());
    buf[64..96].copy_from_slice(output_hash.as_slice());
    buf[96..128].copy_from_slice(agent.into_word().as_slice());
    keccak256(buf)
}

fn push_bounded(queue: &mut VecDeque<ProofRecord>, record: ProofRecord, capacity: usize) -> bool {
    let mut evicted = false;
    while queue.len() >= capacity {
        queue.pop_front();
        evicted = true;
    }
    queue.push_back(record);
    evicted
}

/// Generates, signs and queues proofs. Never touches the network.
#[derive(Debug)]
pub struct ProofGenerator {
    key: Arc<AgentKey>,
    agent: Address,
    model_hash: B256,
    capacity: usize,
    pending: Mutex<VecDeque<ProofRecord>>,
    ready: Mutex<VecDeque<ProofRecord>>,
    dropped: AtomicU64,
}

impl ProofGenerator {
    pub fn new(key: Arc<AgentKey>, model_name: &str) -> Self {
        Self::with_capacity(key, model_name, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(key: Arc<AgentKey>, model_name: &str, capacity: usize) -> Self {
        let agent = key.address();
        Self {
            key,
            agent,
            model_hash: model_hash(model_name),
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
            ready: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn model_hash(&self) -> B256 {
        self.model_hash
    }

    pub fn agent(&self) -> Address {
        self.agent
    }

    /// Build, sign and enqueue a proof from precomputed hashes.
    pub fn generate(
        &self,
        model_hash: B256,
        input_hash: B256,
        output_hash: B256,
        token_count: u64,
    ) -> KernelResult<ProofRecord> {
        let digest = proof_digest(&model_hash, &input_hash, &output_hash, &self.agent);
        let signature = self.key.sign_message(digest.as_slice())?;

        let record = ProofRecord {
            model_hash,
            input_hash,
            output_hash,
            agent_address: self.agent,
            token_count,
            digest,
            signature: signature_to_hex(&signature),
            timestamp: unix_secs(),
        };

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if push_bounded(&mut pending, record.clone(), self.capacity) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(record)
    }

    /// Hash raw input/output against the configured model and enqueue the proof.
    pub fn generate_for_inference(
        &self,
        input: &[u8],
        output: &[u8],
        token_count: u64,
    ) -> KernelResult<ProofRecord> {
        self.generate(self.model_hash, content_hash(input), content_hash(output), token_count)
    }

    /// Take up to `max` of the oldest pending proofs.
    pub fn drain_batch(&self, max: usize) -> Vec<ProofRecord> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let n = max.min(pending.len());
        pending.drain(..n).collect()
    }

    /// Hand proofs that went through the submission cycle over to the reporter.
    pub fn stage_for_report(&self, batch: Vec<ProofRecord>) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        for record in batch {
            if push_bounded(&mut ready, record, self.capacity) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Take up to `max` staged proofs for a report.
    pub fn take_ready(&self, max: usize) -> Vec<ProofRecord> {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        let n = max.min(ready.len());
        ready.drain(..n).collect()
    }

    /// Put back proofs from a report that could not be delivered, ahead of newer ones.
    ///
    /// If that overflows the queue, the oldest records are discarded.
    pub fn requeue_ready(&self, batch: Vec<ProofRecord>) {
        if batch.is_empty() {
            return;
        }
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        for record in batch.into_iter().rev() {
            ready.push_front(record);
        }
        while ready.len() > self.capacity {
            ready.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Proofs discarded because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
