// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Inference Metrics Aggregation
//!
//! The collector is shared between the inference path (writers) and the
//! reporting loop (reader). Every mutation and every snapshot happens under a
//! single lock, so a snapshot always reflects one logical instant.
//!
//! # Guarantees
//! - No lost updates under concurrent `record` calls
//! - Totals are cumulative and never decrease
//! - Rejected samples leave the aggregate untouched

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::{KernelError, KernelResult};

/// One completed inference, as reported by the inference engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub tokens_processed: u64,
    pub latency_ms: f64,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

impl MetricSample {
    pub fn new(tokens_processed: u64, latency_ms: f64) -> Self {
        Self {
            tokens_processed,
            latency_ms,
            timestamp: unix_millis(),
        }
    }
}

/// Immutable point-in-time copy of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_tokens: u64,
    pub task_count: u64,
    pub avg_latency_ms: f64,
    pub uptime_seconds: u64,
    /// Unix time in seconds.
    pub captured_at: u64,
}

impl MetricsSnapshot {
    pub fn tokens_per_second(&self) -> f64 {
        if self.uptime_seconds == 0 {
            return 0.0;
        }
        self.total_tokens as f64 / self.uptime_seconds as f64
    }
}

#[derive(Debug, Default)]
struct Aggregate {
    total_tokens: u64,
    task_count: u64,
    total_latency_ms: f64,
}

/// Thread-safe accumulator of inference samples.
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    inner: Mutex<Aggregate>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(Aggregate::default()),
        }
    }

    /// Fold a sample into the aggregate.
    ///
    /// Negative or non-finite latencies are refused and only the caller sees the error.
    pub fn record(&self, sample: MetricSample) -> KernelResult<()> {
        if !sample.latency_ms.is_finite() || sample.latency_ms < 0.0 {
            return Err(KernelError::InvalidInput(format!(
                "latency_ms must be a finite, non-negative number (got {})",
                sample.latency_ms
            )));
        }

        let mut agg = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let total_tokens = agg
            .total_tokens
            .checked_add(sample.tokens_processed)
            .ok_or_else(|| KernelError::InvalidInput("total token counter overflow".into()))?;

        agg.total_tokens = total_tokens;
        agg.task_count += 1;
        agg.total_latency_ms += sample.latency_ms;
        Ok(())
    }

    /// Shorthand for `record(MetricSample::new(..))`.
    pub fn record_inference(&self, tokens_processed: u64, latency_ms: f64) -> KernelResult<()> {
        self.record(MetricSample::new(tokens_processed, latency_ms))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let agg = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let avg_latency_ms = if agg.task_count == 0 {
            0.0
        } else {
            agg.total_latency_ms / agg.task_count as f64
        };

        MetricsSnapshot {
            total_tokens: agg.total_tokens,
            task_count: agg.task_count,
            avg_latency_ms,
            uptime_seconds: self.started.elapsed().as_secs(),
            captured_at: unix_secs(),
        }
    }
}

pub(crate) fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
