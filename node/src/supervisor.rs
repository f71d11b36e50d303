// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Lifecycle Supervisor
//!
//! Owns every background loop of the agent. All loops share one
//! `CancellationToken`; `shutdown` trips it, waits up to a grace period and
//! aborts whatever is still running.
//!
//! # Guarantees
//! - An error or panic inside one iteration is logged and the loop carries on
//! - A fatal error (`AgentError::is_fatal`) stops only the loop that hit it
//! - Cancellation is observed between iterations, never in the middle of one

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::AgentError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: Vec<&'static str>,
    pub aborted: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub struct LifecycleSupervisor {
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl LifecycleSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Names of tasks that have not finished yet.
    pub fn running(&self) -> Vec<&'static str> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Spawn a one-shot task. Its error is logged, not propagated.
    pub fn spawn<Fut>(&self, name: &'static str, future: Fut)
    where
        Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => tracing::debug!(loop_name = name, "task finished"),
                Ok(Err(e)) => tracing::warn!(loop_name = name, error = %e, "task terminated with error"),
                Err(_) => tracing::error!(loop_name = name, "task panicked"),
            }
        });
        self.push(name, handle);
    }

    /// Run `tick` every `period`, first after `start_after`, until shutdown.
    pub fn spawn_periodic<F, Fut>(
        &self,
        name: &'static str,
        start_after: Duration,
        period: Duration,
        mut tick: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + start_after, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut iteration: u64 = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                iteration += 1;

                match AssertUnwindSafe(tick()).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if e.is_fatal() => {
                        tracing::error!(loop_name = name, iteration, error = %e, "fatal error, loop stopped");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(loop_name = name, iteration, error = %e, "iteration failed");
                    }
                    Err(_) => {
                        tracing::error!(loop_name = name, iteration, "iteration panicked");
                    }
                }
            }
            tracing::debug!(loop_name = name, "loop exited");
        });
        self.push(name, handle);
    }

    /// Signal every task, wait up to `grace`, abort stragglers.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();
        for (name, mut handle) in tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.completed.push(name),
                Ok(Err(e)) => {
                    tracing::warn!(loop_name = name, error = %e, "task aborted");
                    report.aborted.push(name);
                }
                Err(_) => {
                    tracing::warn!(loop_name = name, "task exceeded shutdown grace period, aborting");
                    handle.abort();
                    report.aborted.push(name);
                }
            }
        }
        report
    }

    fn push(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name, handle));
    }
}
