// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Oracle Reporter
//!
//! Each cycle snapshots the collector, takes the staged proofs, signs the
//! report and delivers it with bounded retries. A report that still fails is
//! dropped; its proofs go back to the front of the ready queue so the next
//! report carries them.
//!
//! # Guarantees
//! - A report is delivered at most once per cycle (retries stop at the first success)
//! - Failure never touches the collector or the identity
//! - Shutdown interrupts backoff and in-flight sends; the proofs are re-queued

use plumise_agent_kernel::keys::AgentKey;
use plumise_agent_kernel::metrics::MetricsCollector;
use plumise_agent_kernel::proof::ProofGenerator;
use plumise_agent_kernel::report::{ReportPayload, SignedReport};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agent::backoff_delay;
use crate::config::LifecycleConfig;
use crate::errors::AgentError;
use crate::network::OracleClient;
use crate::telemetry;

/// Consecutive dropped reports before the reporter starts logging at error level.
pub const FAILURE_ESCALATION_THRESHOLD: u32 = 10;
/// Upper bound on proofs attached to one report.
pub const MAX_PROOFS_PER_REPORT: usize = 500;

const MAX_REPORT_BACKOFF: Duration = Duration::from_secs(30);

pub struct OracleReporter {
    oracle: OracleClient,
    key: Arc<AgentKey>,
    collector: Arc<MetricsCollector>,
    proofs: Arc<ProofGenerator>,
    max_attempts: u32,
    backoff: Duration,
    consecutive_failures: AtomicU32,
}

impl OracleReporter {
    pub fn new(
        oracle: OracleClient,
        key: Arc<AgentKey>,
        collector: Arc<MetricsCollector>,
        proofs: Arc<ProofGenerator>,
        lifecycle: &LifecycleConfig,
    ) -> Self {
        Self {
            oracle,
            key,
            collector,
            proofs,
            max_attempts: lifecycle.report_max_attempts.max(1),
            backoff: lifecycle.report_backoff,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Snapshot, attach staged proofs, sign.
    pub fn build_report(&self) -> Result<SignedReport, AgentError> {
        let snapshot = self.collector.snapshot();
        let proofs = self.proofs.take_ready(MAX_PROOFS_PER_REPORT);
        let payload = ReportPayload::from_snapshot(self.key.address(), &snapshot, proofs);

        match payload.clone().sign(&self.key) {
            Ok(signed) => Ok(signed),
            Err(e) => {
                self.proofs.requeue_ready(payload.proofs);
                Err(e.into())
            }
        }
    }

    /// One reporting cycle with retries. Returns the number of attempts used.
    ///
    /// `AgentError::Cancelled` when `cancel` fires first.
    pub async fn report_once(&self, cancel: &CancellationToken) -> Result<u32, AgentError> {
        let report = self.build_report()?;
        self.finish(report, self.max_attempts, cancel).await
    }

    /// Single attempt, used on shutdown.
    pub async fn send_final_report(&self) -> Result<(), AgentError> {
        let report = self.build_report()?;
        self.finish(report, 1, &CancellationToken::new()).await.map(|_| ())
    }

    async fn finish(
        &self,
        report: SignedReport,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<u32, AgentError> {
        match self.deliver(&report, max_attempts, cancel).await {
            Ok(attempts) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                metrics::increment_counter!(telemetry::REPORTS_SENT);
                tracing::info!(
                    tokens = report.payload.processed_tokens,
                    tasks = report.payload.tasks_completed,
                    proofs = report.payload.proofs.len(),
                    attempts,
                    "report delivered"
                );
                Ok(attempts)
            }
            Err(AgentError::Cancelled) => {
                let proofs = report.into_proofs();
                let requeued = proofs.len();
                self.proofs.requeue_ready(proofs);
                tracing::info!(loop_name = "report", requeued, "report interrupted by shutdown");
                Err(AgentError::Cancelled)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::increment_counter!(telemetry::REPORT_FAILURES);
                let proofs = report.into_proofs();
                let requeued = proofs.len();
                self.proofs.requeue_ready(proofs);

                if failures >= FAILURE_ESCALATION_THRESHOLD {
                    tracing::error!(loop_name = "report", consecutive_failures = failures, requeued, error = %e, "oracle unreachable");
                } else {
                    tracing::warn!(loop_name = "report", consecutive_failures = failures, requeued, error = %e, "report dropped");
                }
                Err(e)
            }
        }
    }

    async fn deliver(
        &self,
        report: &SignedReport,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<u32, AgentError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                sent = self.oracle.submit_report(report) => sent,
            };
            match sent {
                Ok(()) => return Ok(attempt),
                Err(e) if e.is_fatal() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = backoff_delay(self.backoff, attempt, MAX_REPORT_BACKOFF);
                    tracing::warn!(
                        loop_name = "report",
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "report delivery failed"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
