// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Signed Oracle Reports
//!
//! The signature covers the canonical JSON of the report body without the
//! `signature` field: keys sorted at every level, no whitespace.
//! Anyone holding the JSON body can strip `signature`, re-canonicalize and
//! recover the signer, which is what `recover_report_signer` does.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{KernelError, KernelResult};
use crate::keys::{recover_message_signer, signature_to_hex, AgentKey};
use crate::metrics::{unix_secs, MetricsSnapshot};
use crate::proof::ProofRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub agent: String,
    pub processed_tokens: u64,
    pub avg_latency_ms: f64,
    pub uptime_seconds: u64,
    pub tasks_completed: u64,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proofs: Vec<ProofRecord>,
}

impl ReportPayload {
    pub fn from_snapshot(agent: Address, snapshot: &MetricsSnapshot, proofs: Vec<ProofRecord>) -> Self {
        Self {
            agent: agent.to_checksum(None),
            processed_tokens: snapshot.total_tokens,
            avg_latency_ms: round2(snapshot.avg_latency_ms),
            uptime_seconds: snapshot.uptime_seconds,
            tasks_completed: snapshot.task_count,
            timestamp: unix_secs(),
            proofs,
        }
    }

    pub fn canonical_json(&self) -> KernelResult<String> {
        canonical_json(self)
    }

    pub fn sign(self, key: &AgentKey) -> KernelResult<SignedReport> {
        let canonical = self.canonical_json()?;
        let signature = key.sign_message(canonical.as_bytes())?;
        Ok(SignedReport {
            payload: self,
            signature: signature_to_hex(&signature),
        })
    }
}

/// Wire body of `POST /api/v1/report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedReport {
    #[serde(flatten)]
    pub payload: ReportPayload,
    pub signature: String,
}

impl SignedReport {
    /// BLAKE3 of the canonical payload; identical across retries of one report.
    pub fn report_id(&self) -> KernelResult<String> {
        let canonical = self.payload.canonical_json()?;
        Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    pub fn recover_signer(&self) -> KernelResult<Address> {
        let canonical = self.payload.canonical_json()?;
        recover_message_signer(canonical.as_bytes(), &self.signature)
    }

    /// Take the proofs back out, e.g. to re-queue them after a failed delivery.
    pub fn into_proofs(self) -> Vec<ProofRecord> {
        self.payload.proofs
    }
}

/// Recover the signer of an arbitrary JSON report body.
pub fn recover_report_signer(body: &Value) -> KernelResult<Address> {
    let mut object = body
        .as_object()
        .cloned()
        .ok_or_else(|| KernelError::InvalidInput("report body must be a JSON object".into()))?;
    let signature = match object.remove("signature") {
        Some(Value::String(s)) => s,
        _ => return Err(KernelError::InvalidInput("report has no string `signature`".into())),
    };
    let canonical = serde_json::to_string(&sort_keys(Value::Object(object)))
        .map_err(|e| KernelError::Encoding(e.to_string()))?;
    recover_message_signer(canonical.as_bytes(), &signature)
}

/// Sorted-key, compact JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> KernelResult<String> {
    let value = serde_json::to_value(value).map_err(|e| KernelError::Encoding(e.to_string()))?;
    serde_json::to_string(&sort_keys(value)).map_err(|e| KernelError::Encoding(e.to_string()))
}

// Rebuilt explicitly so the order holds even when serde_json's `preserve_order` is on.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
