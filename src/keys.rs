// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Agent key material.
//!
//! The private key is loaded once and never leaves this type: there is no
//! accessor for it, `Debug` redacts it, and nothing here serializes it.

use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use core::fmt;

use crate::error::{KernelError, KernelResult};

pub struct AgentKey {
    signer: PrivateKeySigner,
}

impl AgentKey {
    /// Load a secp256k1 key from hex, with or without the `0x` prefix.
    pub fn from_hex(key_hex: &str) -> KernelResult<Self> {
        let trimmed = key_hex.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if stripped.is_empty() {
            return Err(KernelError::Signature("private key is empty".into()));
        }
        let signer: PrivateKeySigner = stripped
            .parse()
            .map_err(|e| KernelError::Signature(format!("malformed private key: {e}")))?;
        Ok(Self { signer })
    }

    /// Address derived from the key. Pure: same key, same address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// EIP-55 checksummed address string.
    pub fn address_checksummed(&self) -> String {
        self.address().to_checksum(None)
    }

    /// EIP-191 `personal_sign` over `message`.
    pub fn sign_message(&self, message: &[u8]) -> KernelResult<Signature> {
        self.signer
            .sign_message_sync(message)
            .map_err(|e| KernelError::Signature(e.to_string()))
    }

    /// Raw ECDSA over a 32-byte prehash (transaction signing).
    pub fn sign_hash(&self, hash: &B256) -> KernelResult<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| KernelError::Signature(e.to_string()))
    }
}

impl fmt::Debug for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentKey")
            .field("address", &self.address())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// `0x`-prefixed 65-byte `r || s || v` encoding.
pub fn signature_to_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}

pub fn signature_from_hex(sig_hex: &str) -> KernelResult<Signature> {
    let bytes = hex::decode(sig_hex.trim_start_matches("0x"))
        .map_err(|e| KernelError::InvalidInput(format!("signature is not hex: {e}")))?;
    Signature::try_from(bytes.as_slice())
        .map_err(|e| KernelError::InvalidInput(format!("malformed signature: {e}")))
}

/// Recover the address that `personal_sign`ed `message`.
pub fn recover_message_signer(message: &[u8], sig_hex: &str) -> KernelResult<Address> {
    let signature = signature_from_hex(sig_hex)?;
    signature
        .recover_address_from_msg(message)
        .map_err(|e| KernelError::Signature(format!("recovery failed: {e}")))
}
