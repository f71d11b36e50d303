// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use plumise_agent_kernel::metrics::MetricsSnapshot;
use plumise_agent_kernel::proof::ProofRecord;
use plumise_agent_kernel::reward::RewardState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub registration: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub address: String,
    pub agent_name: String,
    pub chain_id: u64,
    pub registration: String,
    pub metrics: MetricsSnapshot,
    pub tokens_per_second: f64,
    pub pending_proofs: usize,
    pub ready_proofs: usize,
    pub dropped_proofs: u64,
    pub reward: RewardState,
    pub claim_in_flight: bool,
    pub report_failures: u32,
}

/// Completion hook called by the inference engine.
///
/// `input` and `output` are hashed as their UTF-8 bytes.
#[derive(Debug, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub input: String,
    pub output: String,
    pub tokens: u64,
    pub latency_ms: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub proof: ProofRecord,
}
