// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const INFERENCES_RECORDED: &str = "plumise_inferences_recorded_total";
pub const PROOFS_GENERATED: &str = "plumise_proofs_generated_total";
pub const REPORTS_SENT: &str = "plumise_reports_sent_total";
pub const REPORT_FAILURES: &str = "plumise_report_failures_total";
pub const HEARTBEATS: &str = "plumise_heartbeats_total";
pub const TRANSACTIONS_SUBMITTED: &str = "plumise_transactions_submitted_total";
pub const REWARDS_CLAIMED: &str = "plumise_rewards_claimed_total";
pub const AGENT_UP: &str = "plumise_agent_up";

/// Initialize telemetry (logs + metrics). Safe to call more than once.
pub fn init_telemetry() {
    // 1. Tracing
    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "plumise_agent_node=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        tracing::debug!(error = %e, "tracing subscriber already installed, keeping it");
    }

    // 2. Prometheus recorder
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            return;
        }
    }

    metrics::describe_counter!(INFERENCES_RECORDED, "Inferences recorded by the agent");
    metrics::describe_counter!(PROOFS_GENERATED, "Inference proofs generated and signed");
    metrics::describe_counter!(REPORTS_SENT, "Signed reports accepted by the oracle");
    metrics::describe_counter!(REPORT_FAILURES, "Reports dropped after exhausting retries");
    metrics::describe_counter!(HEARTBEATS, "Heartbeat transactions confirmed");
    metrics::describe_counter!(TRANSACTIONS_SUBMITTED, "Raw transactions broadcast");
    metrics::describe_counter!(REWARDS_CLAIMED, "Reward claims confirmed");

    metrics::gauge!(AGENT_UP, 1.0);
}

/// Render the Prometheus exposition text.
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
