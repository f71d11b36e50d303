// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::metrics::{MetricSample, MetricsCollector};
use std::sync::Arc;
use std::thread;

#[test]
fn test_three_inference_scenario() {
    let collector = MetricsCollector::new();
    collector.record_inference(10, 50.0).unwrap();
    collector.record_inference(20, 100.0).unwrap();
    collector.record_inference(5, 10.0).unwrap();

    let snap = collector.snapshot();
    assert_eq!(snap.total_tokens, 35);
    assert_eq!(snap.task_count, 3);
    assert!((snap.avg_latency_ms - 160.0 / 3.0).abs() < 1e-9);
    assert_eq!((snap.avg_latency_ms * 100.0).round() / 100.0, 53.33);
}

#[test]
fn test_empty_snapshot() {
    let collector = MetricsCollector::new();
    let snap = collector.snapshot();
    assert_eq!(snap.total_tokens, 0);
    assert_eq!(snap.task_count, 0);
    assert_eq!(snap.avg_latency_ms, 0.0);
    assert_eq!(snap.tokens_per_second(), 0.0);
}

#[test]
fn test_concurrent_records_lose_nothing() {
    let collector = Arc::new(MetricsCollector::new());
    let threads = 16;
    let per_thread = 500u64;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let c = collector.clone();
            thread::spawn(move || {
                for i in 0..per_thread {
                    c.record_inference(t as u64 + i, 1.0).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected: u64 = (0..threads as u64)
        .map(|t| (0..per_thread).map(|i| t + i).sum::<u64>())
        .sum();
    let snap = collector.snapshot();
    assert_eq!(snap.total_tokens, expected);
    assert_eq!(snap.task_count, threads as u64 * per_thread);
    assert!((snap.avg_latency_ms - 1.0).abs() < 1e-9);
}

#[test]
fn test_negative_latency_rejected_without_mutation() {
    let collector = MetricsCollector::new();
    collector.record_inference(7, 20.0).unwrap();

    let err = collector.record(MetricSample::new(100, -1.0)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidInput(_)));
    let err = collector.record(MetricSample::new(100, f64::NAN)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidInput(_)));

    let snap = collector.snapshot();
    assert_eq!(snap.total_tokens, 7);
    assert_eq!(snap.task_count, 1);
    assert_eq!(snap.avg_latency_ms, 20.0);
}

#[test]
fn test_snapshots_are_monotonic_while_writers_run() {
    let collector = Arc::new(MetricsCollector::new());
    let writer = {
        let c = collector.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                c.record_inference(3, 2.0).unwrap();
            }
        })
    };

    let mut last = collector.snapshot();
    for _ in 0..200 {
        let snap = collector.snapshot();
        assert!(snap.total_tokens >= last.total_tokens);
        assert!(snap.task_count >= last.task_count);
        assert!(snap.uptime_seconds >= last.uptime_seconds);
        // Every sample carries 3 tokens, so a torn read would break this.
        assert_eq!(snap.total_tokens, snap.task_count * 3);
        last = snap;
    }
    writer.join().unwrap();
}
