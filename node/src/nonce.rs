// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Nonce Management
//!
//! Every transaction the agent sends takes its nonce from one `NonceManager`.
//! A `NonceLease` holds the manager's lock from nonce assignment until the
//! signed transaction has been handed to the node, so two loops can never
//! hold the same nonce and broadcasts leave in nonce order.
//!
//! # Invariants
//! - The on-chain count is fetched on first use, then tracked locally
//! - The local counter only advances on `commit` (the node accepted the tx)
//! - `resync` / `invalidate` drop the local value; the next lease re-fetches

use alloy::primitives::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::errors::AgentError;
use crate::network::ChainRpc;

pub struct NonceManager {
    rpc: Arc<dyn ChainRpc>,
    address: Address,
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    pub fn new(rpc: Arc<dyn ChainRpc>, address: Address) -> Self {
        Self {
            rpc,
            address,
            next: Mutex::new(None),
        }
    }

    /// Wait for exclusive use of the next nonce.
    pub async fn lease(&self) -> Result<NonceLease<'_>, AgentError> {
        let mut guard = self.next.lock().await;
        let nonce = match *guard {
            Some(n) => n,
            None => {
                let n = self.rpc.transaction_count(self.address).await?;
                tracing::debug!(address = %self.address, nonce = n, "nonce synced from chain");
                *guard = Some(n);
                n
            }
        };
        Ok(NonceLease {
            manager: self,
            guard,
            nonce,
        })
    }

    /// Locally tracked next nonce, if synced.
    pub async fn peek(&self) -> Option<u64> {
        *self.next.lock().await
    }
}

pub struct NonceLease<'a> {
    manager: &'a NonceManager,
    guard: MutexGuard<'a, Option<u64>>,
    nonce: u64,
}

impl NonceLease<'_> {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Re-read the chain's count and take that as this lease's nonce.
    pub async fn resync(&mut self) -> Result<u64, AgentError> {
        let manager = self.manager;
        let n = match manager.rpc.transaction_count(manager.address).await {
            Ok(n) => n,
            Err(e) => {
                *self.guard = None;
                return Err(e);
            }
        };
        tracing::warn!(old = self.nonce, new = n, "nonce resynced from chain");
        *self.guard = Some(n);
        self.nonce = n;
        Ok(n)
    }

    /// The node accepted a transaction with this nonce.
    pub fn commit(mut self) {
        *self.guard = Some(self.nonce + 1);
    }

    /// Outcome unknown (e.g. the broadcast timed out); re-fetch next time.
    pub fn invalidate(mut self) {
        *self.guard = None;
    }
}
