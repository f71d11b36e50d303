// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reward polling and claiming.
//!
//! At most one claim is in flight at a time. The flag is released by a drop
//! guard, so a cancelled poll cannot leave it stuck.

use alloy::primitives::{Address, U256};
use plumise_agent_kernel::abi;
use plumise_agent_kernel::config::GAS_LIMIT_CLAIM;
use plumise_agent_kernel::reward::RewardState;
use plumise_agent_kernel::tx::Receipt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::{AgentError, TxOutcome};
use crate::identity::AgentIdentity;
use crate::network::ChainRpc;
use crate::telemetry;

#[derive(Debug, Clone, Serialize)]
pub struct RewardSummary {
    pub pending_wei: U256,
    pub current_epoch: Option<u64>,
    pub last_claimed_epoch: Option<u64>,
    pub threshold_wei: U256,
}

pub struct RewardTracker {
    identity: Arc<AgentIdentity>,
    rpc: Arc<dyn ChainRpc>,
    pool: Option<Address>,
    state: Mutex<RewardState>,
    in_flight: AtomicBool,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RewardTracker {
    pub fn new(
        identity: Arc<AgentIdentity>,
        rpc: Arc<dyn ChainRpc>,
        pool: Option<Address>,
        threshold: U256,
    ) -> Self {
        Self {
            identity,
            rpc,
            pool,
            state: Mutex::new(RewardState::new(threshold)),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    pub fn state(&self) -> RewardState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn claim_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn pending_reward(&self) -> Result<U256, AgentError> {
        let pool = self.pool_address()?;
        let ret = self
            .rpc
            .call(pool, abi::pending_reward_call(&self.identity.address()))
            .await?;
        Ok(abi::decode_u256(&ret)?)
    }

    pub async fn current_epoch(&self) -> Result<u64, AgentError> {
        let pool = self.pool_address()?;
        let ret = self.rpc.call(pool, abi::current_epoch_call()).await?;
        let epoch = abi::decode_u256(&ret)?;
        u64::try_from(epoch).map_err(|_| AgentError::InvalidInput(format!("epoch {epoch} out of range")))
    }

    /// One poll. Returns the claim receipt when a claim was made and confirmed.
    pub async fn poll(&self) -> Result<Option<Receipt>, AgentError> {
        let Some(pool) = self.pool else {
            return Ok(None);
        };

        let pending = self.pending_reward().await?;
        let due = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.refresh(pending);
            state.should_claim()
        };
        tracing::debug!(pending_wei = %pending, due, "reward polled");
        if !due {
            return Ok(None);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("claim already in flight");
            return Ok(None);
        }
        let _guard = InFlight(&self.in_flight);

        let epoch = self.epoch_best_effort().await;
        tracing::info!(pending_wei = %pending, epoch = ?epoch, "claiming reward");

        match self
            .identity
            .submit_and_wait(pool, abi::claim_reward_call(), GAS_LIMIT_CLAIM)
            .await
        {
            TxOutcome::Confirmed(receipt) => {
                self.state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_claim(epoch);
                metrics::increment_counter!(telemetry::REWARDS_CLAIMED);
                tracing::info!(tx = %receipt.tx_hash, epoch = ?epoch, amount_wei = %pending, "reward claimed");
                Ok(Some(receipt))
            }
            TxOutcome::Retryable(e) => {
                tracing::warn!(loop_name = "reward", error = %e, "claim not confirmed, retrying next cycle");
                Err(e)
            }
            TxOutcome::Fatal(e) => {
                tracing::error!(loop_name = "reward", error = %e, "claim rejected");
                Err(e)
            }
        }
    }

    pub async fn summary(&self) -> Result<RewardSummary, AgentError> {
        let pending_wei = self.pending_reward().await?;
        let current_epoch = self.epoch_best_effort().await;
        let state = self.state();
        Ok(RewardSummary {
            pending_wei,
            current_epoch,
            last_claimed_epoch: state.last_claimed_epoch,
            threshold_wei: state.threshold_amount,
        })
    }

    /// The epoch is informational; a pool without `getCurrentEpoch` still gets claims.
    async fn epoch_best_effort(&self) -> Option<u64> {
        match self.current_epoch().await {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                tracing::warn!(loop_name = "reward", error = %e, "epoch lookup failed");
                None
            }
        }
    }

    fn pool_address(&self) -> Result<Address, AgentError> {
        self.pool
            .ok_or_else(|| AgentError::Config("REWARD_POOL_ADDRESS is not set".into()))
    }
}
