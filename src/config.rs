// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Protocol constants.

use alloy::primitives::{address, Address};

/// Precompile recording an inference proof on-chain.
pub const PRECOMPILE_VERIFY_INFERENCE: Address = address!("0000000000000000000000000000000000000020");

/// Precompile creating the agent record.
pub const PRECOMPILE_AGENT_REGISTER: Address = address!("0000000000000000000000000000000000000021");

/// Precompile bumping the agent's last-active timestamp. Uses `msg.sender`.
pub const PRECOMPILE_AGENT_HEARTBEAT: Address = address!("0000000000000000000000000000000000000022");

pub const GAS_LIMIT_REGISTER: u64 = 300_000;
pub const GAS_LIMIT_HEARTBEAT: u64 = 100_000;
pub const GAS_LIMIT_VERIFY: u64 = 150_000;
pub const GAS_LIMIT_CLAIM: u64 = 200_000;

/// Maximum byte length of an on-chain agent name.
pub const AGENT_NAME_LEN: usize = 32;

/// Default claim threshold: 1 PLM in wei.
pub const DEFAULT_CLAIM_THRESHOLD_WEI: u128 = 1_000_000_000_000_000_000;

/// Default chain id of the Plumise network.
pub const DEFAULT_CHAIN_ID: u64 = 41956;
