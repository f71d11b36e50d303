// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! On-chain agent operations: registration, heartbeat and proof verification.
//!
//! Heartbeats and verifications are refused unless the identity is
//! `Registered`; after `Failed` the heartbeat reports a fatal error so its
//! loop stops. Registration retries with exponential backoff up to the
//! configured attempt bound (`0` retries until cancelled).

use alloy::primitives::{Address, Bytes, B256};
use plumise_agent_kernel::abi;
use plumise_agent_kernel::config::{
    GAS_LIMIT_HEARTBEAT, GAS_LIMIT_REGISTER, GAS_LIMIT_VERIFY, PRECOMPILE_AGENT_HEARTBEAT,
    PRECOMPILE_AGENT_REGISTER, PRECOMPILE_VERIFY_INFERENCE,
};
use plumise_agent_kernel::proof::{model_hash, ProofRecord};
use plumise_agent_kernel::registration::{RegistrationEvent, RegistrationState};
use plumise_agent_kernel::tx::Receipt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::errors::{AgentError, TxOutcome};
use crate::identity::AgentIdentity;
use crate::network::ChainRpc;
use crate::telemetry;

const MAX_REGISTRATION_BACKOFF: Duration = Duration::from_secs(60);

pub struct ChainAgent {
    identity: Arc<AgentIdentity>,
    rpc: Arc<dyn ChainRpc>,
    registry: Option<Address>,
    agent_name: String,
    model_hash: B256,
    capabilities: Vec<B256>,
    max_attempts: u32,
    backoff: Duration,
}

impl ChainAgent {
    pub fn new(identity: Arc<AgentIdentity>, rpc: Arc<dyn ChainRpc>, config: &AgentConfig) -> Self {
        let agent_name = abi::agent_name(&config.model_name, &identity.address());
        Self {
            identity,
            rpc,
            registry: config.agent_registry_address,
            agent_name,
            model_hash: model_hash(&config.model_name),
            capabilities: config.capabilities.iter().map(|c| abi::capability_id(c)).collect(),
            max_attempts: config.lifecycle.registration_max_attempts,
            backoff: config.lifecycle.registration_backoff,
        }
    }

    pub fn identity(&self) -> &Arc<AgentIdentity> {
        &self.identity
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Ask the registry contract, if one is configured.
    pub async fn check_registry(&self) -> Result<bool, AgentError> {
        let Some(registry) = self.registry else {
            return Ok(false);
        };
        let ret = self
            .rpc
            .call(registry, abi::is_registered_call(&self.identity.address()))
            .await?;
        Ok(abi::decode_bool(&ret)?)
    }

    /// One registration transaction, start to receipt.
    pub async fn register_once(&self) -> TxOutcome {
        let data = abi::encode_registration(&self.agent_name, &self.model_hash, &self.capabilities);
        self.identity
            .submit_and_wait(PRECOMPILE_AGENT_REGISTER, data, GAS_LIMIT_REGISTER)
            .await
    }

    /// Register, retrying until `Registered`, `Failed`, or cancellation.
    pub async fn register(&self, cancel: &CancellationToken) -> Result<RegistrationState, AgentError> {
        let state = self.identity.registration_state();
        if state.is_terminal() {
            return Ok(state);
        }

        match self.check_registry().await {
            Ok(true) => {
                tracing::info!(name = %self.agent_name, "agent already registered on-chain");
                return self.identity.apply(RegistrationEvent::FoundOnChain);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "registry lookup failed, registering anyway"),
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.identity.apply(RegistrationEvent::Submitted)?;
            tracing::info!(loop_name = "registration", attempt, name = %self.agent_name, "submitting registration");

            let err = match self.register_once().await {
                TxOutcome::Confirmed(receipt) => {
                    tracing::info!(tx = %receipt.tx_hash, block = ?receipt.block_number, "agent registered");
                    return self.identity.apply(RegistrationEvent::Confirmed);
                }
                TxOutcome::Fatal(e) if e.is_fatal() => {
                    tracing::error!(loop_name = "registration", attempt, error = %e, "signer unusable");
                    self.identity.apply(RegistrationEvent::SignerFault)?;
                    return Err(e);
                }
                TxOutcome::Fatal(e) if e.to_string().to_ascii_lowercase().contains("already registered") => {
                    tracing::info!("registration precompile reports agent already registered");
                    return self.identity.apply(RegistrationEvent::FoundOnChain);
                }
                TxOutcome::Retryable(e) | TxOutcome::Fatal(e) => e,
            };

            let retries_remain = self.max_attempts == 0 || attempt < self.max_attempts;
            let state = self
                .identity
                .apply(RegistrationEvent::Rejected { retries_remain })?;
            if !retries_remain {
                tracing::error!(loop_name = "registration", attempt, error = %err, "registration failed, giving up");
                return Ok(state);
            }

            let delay = backoff_delay(self.backoff, attempt, MAX_REGISTRATION_BACKOFF);
            tracing::warn!(
                loop_name = "registration",
                attempt,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "registration attempt failed"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(self.identity.registration_state()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Send one heartbeat. `Ok(None)` when skipped because registration is still
    /// pending; `AgentError::RegistrationFailed` once it has failed for good.
    pub async fn heartbeat(&self) -> Result<Option<Receipt>, AgentError> {
        if self.identity.registration_state() == RegistrationState::Failed {
            return Err(AgentError::RegistrationFailed);
        }
        if !self.identity.is_registered() {
            tracing::debug!(
                state = self.identity.registration_state().as_str(),
                "not registered, skipping heartbeat"
            );
            return Ok(None);
        }

        match self
            .identity
            .submit_and_wait(PRECOMPILE_AGENT_HEARTBEAT, Bytes::new(), GAS_LIMIT_HEARTBEAT)
            .await
        {
            TxOutcome::Confirmed(receipt) => {
                metrics::increment_counter!(telemetry::HEARTBEATS);
                tracing::debug!(tx = %receipt.tx_hash, "heartbeat confirmed");
                Ok(Some(receipt))
            }
            TxOutcome::Retryable(e) | TxOutcome::Fatal(e) => Err(e),
        }
    }

    /// Submit one proof to the verification precompile.
    pub async fn verify_proof(&self, record: &ProofRecord) -> TxOutcome {
        if !self.identity.is_registered() {
            return TxOutcome::Fatal(AgentError::NotRegistered);
        }
        self.identity
            .submit_and_wait(
                PRECOMPILE_VERIFY_INFERENCE,
                abi::encode_verify_input(record),
                GAS_LIMIT_VERIFY,
            )
            .await
    }
}

/// `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(cap)
}
