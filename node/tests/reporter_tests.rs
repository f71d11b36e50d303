// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use common::{spawn_oracle, test_config, OracleMode, TEST_ADDRESS, TEST_KEY};
use plumise_agent_kernel::keys::AgentKey;
use plumise_agent_kernel::metrics::MetricsCollector;
use plumise_agent_kernel::proof::ProofGenerator;
use plumise_agent_kernel::report::recover_report_signer;
use plumise_agent_node::errors::AgentError;
use plumise_agent_node::network::OracleClient;
use plumise_agent_node::reporter::OracleReporter;
use plumise_agent_node::supervisor::LifecycleSupervisor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Fixture {
    reporter: OracleReporter,
    collector: Arc<MetricsCollector>,
    proofs: Arc<ProofGenerator>,
}

fn fixture(oracle_url: &str, max_attempts: u32) -> Fixture {
    let mut cfg = test_config();
    cfg.lifecycle.report_max_attempts = max_attempts;

    let key = Arc::new(AgentKey::from_hex(TEST_KEY).unwrap());
    let collector = Arc::new(MetricsCollector::new());
    let proofs = Arc::new(ProofGenerator::new(key.clone(), &cfg.model_name));
    let oracle = OracleClient::new(oracle_url, Duration::from_secs(2)).unwrap();
    let reporter = OracleReporter::new(oracle, key, collector.clone(), proofs.clone(), &cfg.lifecycle);
    Fixture { reporter, collector, proofs }
}

#[tokio::test]
async fn test_delivered_once_after_two_failures() {
    let (url, log) = spawn_oracle(OracleMode::FailFirst(2)).await;
    let f = fixture(&url, 3);
    f.collector.record_inference(10, 50.0).unwrap();
    f.collector.record_inference(20, 100.0).unwrap();
    f.collector.record_inference(5, 10.0).unwrap();

    let attempts = f.reporter.report_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(attempts, 3);
    assert_eq!(log.attempts.load(Ordering::SeqCst), 3);
    let accepted = log.accepted.lock().unwrap().clone();
    assert_eq!(accepted.len(), 1, "report must be accepted exactly once");

    let body = &accepted[0];
    assert_eq!(body["agent"], TEST_ADDRESS);
    assert_eq!(body["processed_tokens"], 35);
    assert_eq!(body["tasks_completed"], 3);
    assert_eq!(body["avg_latency_ms"], 53.33);
    assert_eq!(recover_report_signer(body).unwrap().to_checksum(None), TEST_ADDRESS);

    // Every retry carried the same idempotency key
    let ids = log.report_ids.lock().unwrap().clone();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id == &ids[0]));
    assert_eq!(f.reporter.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_report_dropped_after_cap_and_proofs_requeued() {
    let (url, log) = spawn_oracle(OracleMode::FailFirst(usize::MAX)).await;
    let f = fixture(&url, 3);

    f.proofs.generate_for_inference(b"q", b"a", 4).unwrap();
    let batch = f.proofs.drain_batch(10);
    f.proofs.stage_for_report(batch);
    assert_eq!(f.proofs.ready_len(), 1);

    let err = f.reporter.report_once(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::Oracle { status: 500, .. }));
    assert_eq!(log.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(f.proofs.ready_len(), 1, "undelivered proofs go back on the queue");
    assert_eq!(f.reporter.consecutive_failures(), 1);

    // Collector untouched by the failure
    assert_eq!(f.collector.snapshot().task_count, 0);
}

#[tokio::test]
async fn test_status_error_body_counts_as_failure() {
    let (url, log) = spawn_oracle(OracleMode::SoftError).await;
    let f = fixture(&url, 2);

    let err = f.reporter.report_once(&CancellationToken::new()).await.unwrap_err();
    match err {
        AgentError::Oracle { status, message } => {
            assert_eq!(status, 200);
            assert_eq!(message, "bad signature");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(log.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_final_report_is_single_attempt() {
    let (url, log) = spawn_oracle(OracleMode::FailFirst(1)).await;
    let f = fixture(&url, 5);

    assert!(f.reporter.send_final_report().await.is_err());
    assert_eq!(log.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_proofs_ride_on_report() {
    let (url, log) = spawn_oracle(OracleMode::FailFirst(0)).await;
    let f = fixture(&url, 1);

    f.collector.record_inference(3, 1.0).unwrap();
    let record = f.proofs.generate_for_inference(b"in", b"out", 3).unwrap();
    let batch = f.proofs.drain_batch(10);
    f.proofs.stage_for_report(batch);

    f.reporter.report_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(f.proofs.ready_len(), 0);

    let accepted = log.accepted.lock().unwrap().clone();
    let proofs = accepted[0]["proofs"].as_array().unwrap();
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0]["proofHash"], serde_json::json!(record.digest));
    assert_eq!(proofs[0]["tokenCount"], 3);
}

#[tokio::test]
async fn test_unreachable_oracle_is_retryable_network_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let f = fixture(&format!("http://{}", addr), 2);
    let err = f.reporter.report_once(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_retryable(), "got {err:?}");
}

#[tokio::test]
async fn test_cancelled_cycle_keeps_its_proofs() {
    let (url, log) = spawn_oracle(OracleMode::Hang(Duration::from_secs(5))).await;
    let f = Arc::new(fixture(&url, 3));

    f.proofs.generate_for_inference(b"a", b"b", 1).unwrap();
    f.proofs.generate_for_inference(b"c", b"d", 2).unwrap();
    let batch = f.proofs.drain_batch(10);
    f.proofs.stage_for_report(batch);

    let cancel = CancellationToken::new();
    let task = {
        let f = f.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { f.reporter.report_once(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.proofs.ready_len(), 0, "the cycle holds the batch while sending");
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    assert!(matches!(result, Err(AgentError::Cancelled)));
    assert_eq!(f.proofs.ready_len(), 2);
    assert_eq!(f.reporter.consecutive_failures(), 0);
    assert_eq!(log.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_supervisor_shutdown_during_hung_report_requeues_batch() {
    let (url, _log) = spawn_oracle(OracleMode::Hang(Duration::from_secs(5))).await;
    let f = Arc::new(fixture(&url, 3));
    f.proofs.generate_for_inference(b"a", b"b", 1).unwrap();
    f.proofs.generate_for_inference(b"c", b"d", 2).unwrap();
    let batch = f.proofs.drain_batch(10);
    f.proofs.stage_for_report(batch);

    let supervisor = LifecycleSupervisor::new();
    let token = supervisor.token();
    let reporter = f.clone();
    supervisor.spawn_periodic("report", Duration::ZERO, Duration::from_secs(3600), move || {
        let f = reporter.clone();
        let token = token.clone();
        async move {
            match f.reporter.report_once(&token).await {
                Ok(_) | Err(AgentError::Cancelled) => Ok(()),
                Err(e) => Err(e),
            }
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = supervisor.shutdown(Duration::from_millis(200)).await;
    assert_eq!(report.completed, vec!["report"]);
    assert!(report.aborted.is_empty());
    assert_eq!(f.proofs.ready_len(), 2);
    assert_eq!(f.proofs.pending_len(), 0);
}
