// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod oracle;
pub mod rpc;

pub use oracle::OracleClient;
pub use rpc::{wait_for_receipt, ChainRpc, JsonRpcClient};
