// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reward bookkeeping.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardState {
    /// Unclaimed reward in wei, as of the last poll.
    pub pending_amount: U256,
    pub last_claimed_epoch: Option<u64>,
    pub threshold_amount: U256,
}

impl RewardState {
    pub fn new(threshold_amount: U256) -> Self {
        Self {
            pending_amount: U256::ZERO,
            last_claimed_epoch: None,
            threshold_amount,
        }
    }

    pub fn refresh(&mut self, pending_amount: U256) {
        self.pending_amount = pending_amount;
    }

    /// A claim is due once the pending amount reaches the threshold (inclusive).
    pub fn should_claim(&self) -> bool {
        self.pending_amount >= self.threshold_amount
    }

    /// Only call with a confirmed receipt in hand. An unknown epoch keeps the previous one.
    pub fn record_claim(&mut self, epoch: Option<u64>) {
        if epoch.is_some() {
            self.last_claimed_epoch = epoch;
        }
        self.pending_amount = U256::ZERO;
    }
}
