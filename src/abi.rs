// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Calldata encoding for the precompiles and the reward/registry contracts.
//!
//! Everything is fixed-width 32-byte words, so this is hand-encoded rather
//! than going through a full ABI coder.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};

use crate::config::AGENT_NAME_LEN;
use crate::error::{KernelError, KernelResult};
use crate::proof::ProofRecord;

pub const SIG_GET_PENDING_REWARD: &str = "getPendingReward(address)";
pub const SIG_GET_CURRENT_EPOCH: &str = "getCurrentEpoch()";
pub const SIG_CLAIM_REWARD: &str = "claimReward()";
pub const SIG_IS_REGISTERED: &str = "isRegistered(address)";

/// First four bytes of keccak256 of the function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn call_with_address(signature: &str, who: &Address) -> Bytes {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(who.into_word().as_slice());
    Bytes::from(data)
}

pub fn pending_reward_call(agent: &Address) -> Bytes {
    call_with_address(SIG_GET_PENDING_REWARD, agent)
}

pub fn is_registered_call(agent: &Address) -> Bytes {
    call_with_address(SIG_IS_REGISTERED, agent)
}

pub fn current_epoch_call() -> Bytes {
    Bytes::from(selector(SIG_GET_CURRENT_EPOCH).to_vec())
}

pub fn claim_reward_call() -> Bytes {
    Bytes::from(selector(SIG_CLAIM_REWARD).to_vec())
}

/// `{model short name, max 16 chars}-{last 8 hex chars of the address}`.
pub fn agent_name(model_name: &str, agent: &Address) -> String {
    let short: String = model_name
        .rsplit('/')
        .next()
        .unwrap_or(model_name)
        .chars()
        .take(16)
        .collect();
    let addr_hex = hex::encode(agent.as_slice());
    format!("{}-{}", short, &addr_hex[addr_hex.len() - 8..])
}

/// Capability identifiers are keccak256 of their names.
pub fn capability_id(name: &str) -> B256 {
    keccak256(name.as_bytes())
}

/// Registration precompile input:
///
/// ```text
/// [name: 32B, zero padded][modelHash: 32B][capCount: uint256][cap: 32B]*
/// ```
pub fn encode_registration(name: &str, model_hash: &B256, capabilities: &[B256]) -> Bytes {
    let mut name_word = [0u8; AGENT_NAME_LEN];
    let raw = name.as_bytes();
    let n = raw.len().min(AGENT_NAME_LEN);
    name_word[..n].copy_from_slice(&raw[..n]);

    let mut data = Vec::with_capacity(96 + 32 * capabilities.len());
    data.extend_from_slice(&name_word);
    data.extend_from_slice(model_hash.as_slice());
    data.extend_from_slice(&U256::from(capabilities.len() as u64).to_be_bytes::<32>());
    for cap in capabilities {
        data.extend_from_slice(cap.as_slice());
    }
    Bytes::from(data)
}

/// Verification precompile input: `[digest][modelHash][inputHash][outputHash]`, 128 bytes.
pub fn encode_verify_input(record: &ProofRecord) -> Bytes {
    let mut data = Vec::with_capacity(128);
    data.extend_from_slice(record.digest.as_slice());
    data.extend_from_slice(record.model_hash.as_slice());
    data.extend_from_slice(record.input_hash.as_slice());
    data.extend_from_slice(record.output_hash.as_slice());
    Bytes::from(data)
}

pub fn decode_u256(ret: &[u8]) -> KernelResult<U256> {
    if ret.len() < 32 {
        return Err(KernelError::InvalidInput(format!(
            "expected a 32-byte word, got {} bytes",
            ret.len()
        )));
    }
    Ok(U256::from_be_slice(&ret[..32]))
}

pub fn decode_bool(ret: &[u8]) -> KernelResult<bool> {
    Ok(!decode_u256(ret)?.is_zero())
}
