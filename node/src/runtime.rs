// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Composition root.
//!
//! `AgentRuntime` owns every component, wires them together from one
//! `AgentConfig`, and hands the periodic loops to the supervisor.

use alloy::primitives::U256;
use plumise_agent_kernel::keys::AgentKey;
use plumise_agent_kernel::metrics::MetricsCollector;
use plumise_agent_kernel::proof::{ProofGenerator, ProofRecord};
use plumise_agent_kernel::registration::RegistrationState;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::ChainAgent;
use crate::api::StatusResponse;
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::identity::AgentIdentity;
use crate::network::{ChainRpc, JsonRpcClient, OracleClient};
use crate::proof_submitter::ProofSubmitter;
use crate::reporter::OracleReporter;
use crate::rewards::RewardTracker;
use crate::supervisor::{LifecycleSupervisor, ShutdownReport};
use crate::telemetry;

pub struct AgentRuntime {
    config: AgentConfig,
    rpc: Arc<dyn ChainRpc>,
    collector: Arc<MetricsCollector>,
    proofs: Arc<ProofGenerator>,
    identity: Arc<AgentIdentity>,
    agent: Arc<ChainAgent>,
    reporter: Arc<OracleReporter>,
    rewards: Arc<RewardTracker>,
    submitter: Arc<ProofSubmitter>,
    supervisor: LifecycleSupervisor,
}

impl AgentRuntime {
    /// Build against the configured JSON-RPC endpoint.
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let rpc = Arc::new(JsonRpcClient::new(&config.rpc_url, config.rpc_timeout)?);
        Self::with_rpc(config, rpc)
    }

    pub fn with_rpc(config: AgentConfig, rpc: Arc<dyn ChainRpc>) -> Result<Self, AgentError> {
        config.validate()?;
        let key = Arc::new(AgentKey::from_hex(config.private_key())?);

        let collector = Arc::new(MetricsCollector::new());
        let proofs = Arc::new(ProofGenerator::new(key.clone(), &config.model_name));
        let identity = Arc::new(AgentIdentity::new(
            key.clone(),
            rpc.clone(),
            config.chain_id,
            &config.lifecycle,
        ));
        let agent = Arc::new(ChainAgent::new(identity.clone(), rpc.clone(), &config));
        let oracle = OracleClient::new(&config.oracle_url, config.lifecycle.report_timeout)?;
        let reporter = Arc::new(OracleReporter::new(
            oracle,
            key,
            collector.clone(),
            proofs.clone(),
            &config.lifecycle,
        ));
        let rewards = Arc::new(RewardTracker::new(
            identity.clone(),
            rpc.clone(),
            config.reward_pool_address,
            config.claim_threshold_wei,
        ));
        let submitter = Arc::new(ProofSubmitter::new(
            proofs.clone(),
            agent.clone(),
            config.verify_on_chain,
            config.lifecycle.proof_batch_size,
        ));

        tracing::info!(
            address = %identity.address(),
            name = agent.agent_name(),
            model = %config.model_name,
            "agent runtime assembled"
        );

        Ok(Self {
            config,
            rpc,
            collector,
            proofs,
            identity,
            agent,
            reporter,
            rewards,
            submitter,
            supervisor: LifecycleSupervisor::new(),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn proofs(&self) -> &Arc<ProofGenerator> {
        &self.proofs
    }

    pub fn identity(&self) -> &Arc<AgentIdentity> {
        &self.identity
    }

    pub fn agent(&self) -> &Arc<ChainAgent> {
        &self.agent
    }

    pub fn reporter(&self) -> &Arc<OracleReporter> {
        &self.reporter
    }

    pub fn rewards(&self) -> &Arc<RewardTracker> {
        &self.rewards
    }

    pub fn supervisor(&self) -> &LifecycleSupervisor {
        &self.supervisor
    }

    /// Inference completion hook. Synchronous; never touches the network.
    pub fn record_inference(
        &self,
        input: &[u8],
        output: &[u8],
        tokens: u64,
        latency_ms: f64,
    ) -> Result<ProofRecord, AgentError> {
        self.collector.record_inference(tokens, latency_ms)?;
        metrics::increment_counter!(telemetry::INFERENCES_RECORDED);

        let record = self.proofs.generate_for_inference(input, output, tokens)?;
        metrics::increment_counter!(telemetry::PROOFS_GENERATED);
        Ok(record)
    }

    /// Chain id check and balance log. An unreachable chain is not fatal.
    pub async fn preflight(&self) -> Result<(), AgentError> {
        match self.rpc.chain_id().await {
            Ok(id) if id == self.config.chain_id => {
                tracing::info!(chain_id = id, "connected to chain");
            }
            Ok(id) => {
                return Err(AgentError::Config(format!(
                    "chain id mismatch: node reports {id}, configured {}",
                    self.config.chain_id
                )));
            }
            Err(e) => {
                tracing::warn!(error = %e, rpc = %self.config.rpc_url, "chain unreachable, continuing offline");
                return Ok(());
            }
        }

        match self.rpc.balance(self.identity.address()).await {
            Ok(balance) if balance == U256::ZERO => {
                tracing::warn!(address = %self.identity.address(), "agent balance is zero, transactions will fail");
            }
            Ok(balance) => tracing::info!(balance_wei = %balance, "agent balance"),
            Err(e) => tracing::warn!(error = %e, "balance lookup failed"),
        }
        Ok(())
    }

    /// Hand every loop to the supervisor.
    pub fn start(&self) {
        let lc = &self.config.lifecycle;
        let token = self.supervisor.token();

        let agent = self.agent.clone();
        let reg_token = token.clone();
        self.supervisor.spawn("registration", async move {
            match agent.register(&reg_token).await? {
                RegistrationState::Failed => tracing::error!(
                    loop_name = "registration",
                    "registration failed, heartbeat and on-chain verification disabled"
                ),
                state => tracing::info!(loop_name = "registration", state = state.as_str(), "registration finished"),
            }
            Ok(())
        });

        let agent = self.agent.clone();
        self.supervisor.spawn_periodic(
            "heartbeat",
            lc.heartbeat_interval,
            lc.heartbeat_interval,
            move || {
                let agent = agent.clone();
                async move { agent.heartbeat().await.map(|_| ()) }
            },
        );

        let reporter = self.reporter.clone();
        let report_token = token.clone();
        self.supervisor.spawn_periodic(
            "report",
            lc.report_interval,
            lc.report_interval,
            move || {
                let reporter = reporter.clone();
                let token = report_token.clone();
                async move {
                    match reporter.report_once(&token).await {
                        Ok(_) | Err(AgentError::Cancelled) => Ok(()),
                        Err(e) => Err(e),
                    }
                }
            },
        );

        let submitter = self.submitter.clone();
        let submit_token = token.clone();
        self.supervisor.spawn_periodic(
            "proof_submit",
            lc.proof_submit_interval,
            lc.proof_submit_interval,
            move || {
                let submitter = submitter.clone();
                let token = submit_token.clone();
                async move { submitter.run_cycle(&token).await.map(|_| ()) }
            },
        );

        if self.rewards.is_enabled() {
            let rewards = self.rewards.clone();
            self.supervisor.spawn_periodic(
                "reward",
                lc.reward_check_interval,
                lc.reward_check_interval,
                move || {
                    let rewards = rewards.clone();
                    async move { rewards.poll().await.map(|_| ()) }
                },
            );
        } else {
            tracing::info!("REWARD_POOL_ADDRESS not set, reward tracking disabled");
        }

        tracing::info!(tasks = self.supervisor.task_count(), "lifecycle started");
    }

    /// Stop the loops, then send one last report and log a summary.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let report = self.supervisor.shutdown(grace).await;
        tracing::info!(completed = ?report.completed, aborted = ?report.aborted, "loops stopped");

        // Anything still pending goes out with the final report.
        self.proofs.stage_for_report(self.proofs.drain_batch(usize::MAX));
        if let Err(e) = self.reporter.send_final_report().await {
            tracing::warn!(error = %e, "final report not delivered");
        }

        let snap = self.collector.snapshot();
        tracing::info!(
            tokens = snap.total_tokens,
            tasks = snap.task_count,
            avg_latency_ms = snap.avg_latency_ms,
            uptime_seconds = snap.uptime_seconds,
            "final metrics"
        );

        if self.rewards.is_enabled() {
            match self.rewards.summary().await {
                Ok(s) => tracing::info!(
                    pending_wei = %s.pending_wei,
                    epoch = ?s.current_epoch,
                    last_claimed_epoch = ?s.last_claimed_epoch,
                    "reward summary"
                ),
                Err(e) => tracing::warn!(error = %e, "reward summary unavailable"),
            }
        }

        metrics::gauge!(telemetry::AGENT_UP, 0.0);
        report
    }

    pub fn status(&self) -> StatusResponse {
        let metrics = self.collector.snapshot();
        StatusResponse {
            address: self.identity.key().address_checksummed(),
            agent_name: self.agent.agent_name().to_string(),
            chain_id: self.config.chain_id,
            registration: self.identity.registration_state().as_str().to_string(),
            tokens_per_second: metrics.tokens_per_second(),
            metrics,
            pending_proofs: self.proofs.pending_len(),
            ready_proofs: self.proofs.ready_len(),
            dropped_proofs: self.proofs.dropped(),
            reward: self.rewards.state(),
            claim_in_flight: self.rewards.claim_in_flight(),
            report_failures: self.reporter.consecutive_failures(),
        }
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.identity.registration_state()
    }
}
