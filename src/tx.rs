// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Transaction building and signing.
//!
//! Transactions are EIP-155 legacy transactions. Signing is pure: the nonce
//! and gas price are filled in by the caller, who owns the ordering.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::KernelResult;
use crate::keys::AgentKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub chain_id: u64,
}

impl TransactionRequest {
    pub fn sign(self, key: &AgentKey) -> KernelResult<SignedTransaction> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: self.data.clone(),
        };

        let signature = key.sign_hash(&tx.signature_hash())?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();

        Ok(SignedTransaction {
            request: self,
            hash,
            raw: Bytes::from(raw),
        })
    }
}

/// A signed, encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub request: TransactionRequest,
    pub hash: B256,
    pub raw: Bytes,
}

impl SignedTransaction {
    pub fn nonce(&self) -> u64 {
        self.request.nonce
    }

    pub fn to(&self) -> Address {
        self.request.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub status: TxStatus,
    pub block_number: Option<u64>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == TxStatus::Success
    }
}
