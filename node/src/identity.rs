// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Agent identity: key, registration state and transaction submission.
//!
//! All transactions go through `send_transaction`, which takes a nonce lease,
//! signs, broadcasts and only then releases the lease. A bad-nonce rejection
//! resyncs from the chain and retries exactly once.

use alloy::primitives::{Address, Bytes, Signature, U256};
use plumise_agent_kernel::keys::AgentKey;
use plumise_agent_kernel::registration::{RegistrationEvent, RegistrationState};
use plumise_agent_kernel::tx::{SignedTransaction, TransactionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::LifecycleConfig;
use crate::errors::{AgentError, RejectionKind, TxOutcome};
use crate::network::{wait_for_receipt, ChainRpc};
use crate::nonce::{NonceLease, NonceManager};
use crate::telemetry;

pub struct AgentIdentity {
    key: Arc<AgentKey>,
    rpc: Arc<dyn ChainRpc>,
    chain_id: u64,
    nonces: NonceManager,
    state: watch::Sender<RegistrationState>,
    receipt_poll: Duration,
    receipt_timeout: Duration,
}

impl AgentIdentity {
    pub fn new(
        key: Arc<AgentKey>,
        rpc: Arc<dyn ChainRpc>,
        chain_id: u64,
        lifecycle: &LifecycleConfig,
    ) -> Self {
        let nonces = NonceManager::new(rpc.clone(), key.address());
        let (state, _) = watch::channel(RegistrationState::Unregistered);
        Self {
            key,
            rpc,
            chain_id,
            nonces,
            state,
            receipt_poll: lifecycle.receipt_poll_interval,
            receipt_timeout: lifecycle.receipt_timeout,
        }
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn key(&self) -> &Arc<AgentKey> {
        &self.key
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn registration_state(&self) -> RegistrationState {
        *self.state.borrow()
    }

    pub fn is_registered(&self) -> bool {
        self.registration_state() == RegistrationState::Registered
    }

    /// Watch registration changes, e.g. to hold a loop until `Registered`.
    pub fn subscribe(&self) -> watch::Receiver<RegistrationState> {
        self.state.subscribe()
    }

    /// Drive the registration state machine.
    pub fn apply(&self, event: RegistrationEvent) -> Result<RegistrationState, AgentError> {
        let current = self.registration_state();
        let next = current.transition(event)?;
        if next != current {
            tracing::info!(from = current.as_str(), to = next.as_str(), "registration state changed");
        }
        self.state.send_replace(next);
        Ok(next)
    }

    /// The single place nonces are handed out.
    pub async fn next_nonce(&self) -> Result<NonceLease<'_>, AgentError> {
        self.nonces.lease().await
    }

    pub async fn pending_nonce(&self) -> Option<u64> {
        self.nonces.peek().await
    }

    pub fn sign_message(&self, message: &[u8]) -> Result<Signature, AgentError> {
        Ok(self.key.sign_message(message)?)
    }

    /// Sign and broadcast. Returns once the node has accepted the transaction.
    pub async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        gas_limit: u64,
    ) -> Result<SignedTransaction, AgentError> {
        let mut lease = self.next_nonce().await?;
        // Priced under the lease; waiting behind other broadcasts can stale it.
        let gas_price = self.rpc.gas_price().await?;
        let mut resynced = false;

        loop {
            let request = TransactionRequest {
                to,
                data: data.clone(),
                value: U256::ZERO,
                nonce: lease.nonce(),
                gas_limit,
                gas_price,
                chain_id: self.chain_id,
            };
            let signed = request.sign(&self.key)?;

            match self.rpc.send_raw_transaction(&signed).await {
                Ok(_) => {
                    lease.commit();
                    metrics::increment_counter!(telemetry::TRANSACTIONS_SUBMITTED);
                    tracing::debug!(tx = %signed.hash, nonce = signed.nonce(), to = %to, "transaction broadcast");
                    return Ok(signed);
                }
                Err(e) if e.is_bad_nonce() && !resynced => {
                    tracing::warn!(nonce = signed.nonce(), error = %e, "bad nonce, resyncing");
                    resynced = true;
                    lease.resync().await?;
                }
                Err(e) if e.is_retryable() => {
                    // The node may or may not have seen it.
                    lease.invalidate();
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Broadcast, then wait for the receipt outside the nonce lock.
    pub async fn submit_and_wait(&self, to: Address, data: Bytes, gas_limit: u64) -> TxOutcome {
        let signed = match self.send_transaction(to, data, gas_limit).await {
            Ok(signed) => signed,
            Err(e) => return TxOutcome::from_error(e),
        };

        match wait_for_receipt(self.rpc.as_ref(), signed.hash, self.receipt_poll, self.receipt_timeout).await {
            Ok(receipt) if receipt.succeeded() => TxOutcome::Confirmed(receipt),
            Ok(receipt) => TxOutcome::Fatal(AgentError::ChainRejection {
                kind: RejectionKind::Reverted,
                message: format!("transaction {} reverted", receipt.tx_hash),
            }),
            Err(e) => TxOutcome::from_error(e),
        }
    }
}
