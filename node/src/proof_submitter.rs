// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use plumise_agent_kernel::proof::ProofGenerator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::ChainAgent;
use crate::errors::{AgentError, TxOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubmitStats {
    pub drained: usize,
    pub verified: usize,
    pub failed: usize,
}

/// Moves proofs from the pending queue to the report queue, verifying them
/// on-chain on the way when that is enabled.
pub struct ProofSubmitter {
    proofs: Arc<ProofGenerator>,
    agent: Arc<ChainAgent>,
    verify_on_chain: bool,
    batch_size: usize,
}

impl ProofSubmitter {
    pub fn new(
        proofs: Arc<ProofGenerator>,
        agent: Arc<ChainAgent>,
        verify_on_chain: bool,
        batch_size: usize,
    ) -> Self {
        Self {
            proofs,
            agent,
            verify_on_chain,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<SubmitStats, AgentError> {
        let batch = self.proofs.drain_batch(self.batch_size);
        let mut stats = SubmitStats {
            drained: batch.len(),
            ..SubmitStats::default()
        };
        if batch.is_empty() {
            return Ok(stats);
        }

        let verify = self.verify_on_chain && self.agent.identity().is_registered();
        if self.verify_on_chain && !verify {
            tracing::debug!(proofs = batch.len(), "not registered, skipping on-chain verification");
        }

        let mut fatal = None;
        if verify {
            for record in &batch {
                if cancel.is_cancelled() {
                    break;
                }
                match self.agent.verify_proof(record).await {
                    TxOutcome::Confirmed(_) => stats.verified += 1,
                    TxOutcome::Fatal(e) if e.is_fatal() => {
                        fatal = Some(e);
                        break;
                    }
                    TxOutcome::Retryable(e) | TxOutcome::Fatal(e) => {
                        stats.failed += 1;
                        tracing::warn!(loop_name = "proof_submit", proof = %record.digest, error = %e, "verification failed");
                    }
                }
            }
        }

        // Verified or not, every drained proof rides on the next report.
        self.proofs.stage_for_report(batch);
        tracing::debug!(drained = stats.drained, verified = stats.verified, failed = stats.failed, "proof cycle done");

        match fatal {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}
