// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Agent configuration.
//!
//! Built once at startup from the environment (optionally layered over a
//! `.env` file) and passed down by reference. Nothing re-reads the
//! environment after `AgentConfig::from_env` returns.

use alloy::primitives::{Address, U256};
use plumise_agent_kernel::config::{DEFAULT_CHAIN_ID, DEFAULT_CLAIM_THRESHOLD_WEI};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::errors::AgentError;

/// Heartbeats go out every five minutes; not configurable.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);
pub const MIN_REPORT_INTERVAL_SECS: u64 = 10;
/// Reward polling never runs more often than this.
pub const MIN_REWARD_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Timing and retry knobs for the periodic loops.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub report_interval: Duration,
    pub heartbeat_interval: Duration,
    pub proof_submit_interval: Duration,
    pub reward_check_interval: Duration,
    pub proof_batch_size: usize,
    /// 0 retries forever.
    pub registration_max_attempts: u32,
    pub registration_backoff: Duration,
    pub report_max_attempts: u32,
    pub report_backoff: Duration,
    pub report_timeout: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let report_interval = Duration::from_secs(60);
        Self {
            report_interval,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            proof_submit_interval: Duration::from_secs(30),
            reward_check_interval: (report_interval * 5).max(MIN_REWARD_CHECK_INTERVAL),
            proof_batch_size: 100,
            registration_max_attempts: 5,
            registration_backoff: Duration::from_secs(2),
            report_max_attempts: 3,
            report_backoff: Duration::from_secs(1),
            report_timeout: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(30),
            receipt_poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct AgentConfig {
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    pub chain_id: u64,
    private_key: String,
    pub agent_registry_address: Option<Address>,
    pub reward_pool_address: Option<Address>,
    pub oracle_url: String,
    pub model_name: String,
    pub capabilities: Vec<String>,
    pub verify_on_chain: bool,
    pub claim_threshold_wei: U256,
    pub bind_addr: SocketAddr,
    pub auth_token: Option<String>,
    pub lifecycle: LifecycleConfig,
}

impl AgentConfig {
    /// Minimal config around a key; everything else at its default.
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            rpc_url: "http://localhost:26902".to_string(),
            rpc_timeout: Duration::from_secs(10),
            chain_id: DEFAULT_CHAIN_ID,
            private_key: normalize_key(&private_key.into()),
            agent_registry_address: None,
            reward_pool_address: None,
            oracle_url: "http://localhost:3100".to_string(),
            model_name: "bigscience/bloom-560m".to_string(),
            capabilities: Vec::new(),
            verify_on_chain: false,
            claim_threshold_wei: U256::from(DEFAULT_CLAIM_THRESHOLD_WEI),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 31331)),
            auth_token: None,
            lifecycle: LifecycleConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Process environment first, then `KEY=VALUE` lines from `path`.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let file_vars = match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => parse_env_file(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AgentError::Config(format!(
                    "cannot read {}: {}",
                    path.as_ref().display(),
                    e
                )))
            }
        };
        Self::from_lookup(|k| std::env::var(k).ok().or_else(|| file_vars.get(k).cloned()))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut cfg = Self::new(get("PLUMISE_PRIVATE_KEY").unwrap_or_default());

        if let Some(v) = get("PLUMISE_RPC_URL") {
            cfg.rpc_url = v;
        }
        if let Some(v) = get("RPC_TIMEOUT_SECS") {
            cfg.rpc_timeout = Duration::from_secs(parse_num("RPC_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("PLUMISE_CHAIN_ID") {
            cfg.chain_id = parse_num("PLUMISE_CHAIN_ID", &v)?;
        }
        if let Some(v) = get("AGENT_REGISTRY_ADDRESS") {
            cfg.agent_registry_address = Some(parse_address("AGENT_REGISTRY_ADDRESS", &v)?);
        }
        if let Some(v) = get("REWARD_POOL_ADDRESS") {
            cfg.reward_pool_address = Some(parse_address("REWARD_POOL_ADDRESS", &v)?);
        }
        if let Some(v) = get("ORACLE_API_URL") {
            cfg.oracle_url = v;
        }
        if let Some(v) = get("MODEL_NAME") {
            cfg.model_name = v;
        }
        if let Some(v) = get("AGENT_CAPABILITIES") {
            cfg.capabilities = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("VERIFY_ON_CHAIN") {
            cfg.verify_on_chain = parse_bool("VERIFY_ON_CHAIN", &v)?;
        }
        if let Some(v) = get("CLAIM_THRESHOLD_WEI") {
            cfg.claim_threshold_wei = v
                .parse::<U256>()
                .map_err(|e| AgentError::Config(format!("CLAIM_THRESHOLD_WEI: {e}")))?;
        }
        if let Some(v) = get("API_BIND_ADDR") {
            cfg.bind_addr = v
                .parse()
                .map_err(|e| AgentError::Config(format!("API_BIND_ADDR: {e}")))?;
        }
        cfg.auth_token = get("API_AUTH_TOKEN");

        let lc = &mut cfg.lifecycle;
        if let Some(v) = get("REPORT_INTERVAL") {
            lc.report_interval = Duration::from_secs(parse_num("REPORT_INTERVAL", &v)?);
            lc.reward_check_interval = (lc.report_interval * 5).max(MIN_REWARD_CHECK_INTERVAL);
        }
        if let Some(v) = get("PROOF_SUBMIT_INTERVAL") {
            lc.proof_submit_interval = Duration::from_secs(parse_num("PROOF_SUBMIT_INTERVAL", &v)?);
        }
        if let Some(v) = get("PROOF_BATCH_SIZE") {
            lc.proof_batch_size = parse_num("PROOF_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("REGISTRATION_MAX_ATTEMPTS") {
            lc.registration_max_attempts = parse_num("REGISTRATION_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("REPORT_MAX_ATTEMPTS") {
            lc.report_max_attempts = parse_num("REPORT_MAX_ATTEMPTS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.private_key.trim_start_matches("0x").is_empty() {
            return Err(AgentError::Config("PLUMISE_PRIVATE_KEY is required".into()));
        }
        check_url("PLUMISE_RPC_URL", &self.rpc_url)?;
        check_url("ORACLE_API_URL", &self.oracle_url)?;
        if self.lifecycle.report_interval < Duration::from_secs(MIN_REPORT_INTERVAL_SECS) {
            return Err(AgentError::Config(format!(
                "REPORT_INTERVAL must be at least {MIN_REPORT_INTERVAL_SECS}s"
            )));
        }
        if self.lifecycle.proof_batch_size == 0 {
            return Err(AgentError::Config("PROOF_BATCH_SIZE must be positive".into()));
        }
        if self.lifecycle.report_max_attempts == 0 {
            return Err(AgentError::Config("REPORT_MAX_ATTEMPTS must be positive".into()));
        }
        if self.model_name.is_empty() {
            return Err(AgentError::Config("MODEL_NAME must not be empty".into()));
        }
        Ok(())
    }

    /// Hex private key, `0x`-prefixed. Only the identity loader should call this.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &"<redacted>")
            .field("agent_registry_address", &self.agent_registry_address)
            .field("reward_pool_address", &self.reward_pool_address)
            .field("oracle_url", &self.oracle_url)
            .field("model_name", &self.model_name)
            .field("capabilities", &self.capabilities)
            .field("verify_on_chain", &self.verify_on_chain)
            .field("claim_threshold_wei", &self.claim_threshold_wei)
            .field("bind_addr", &self.bind_addr)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() || key.starts_with("0x") {
        key.to_string()
    } else {
        format!("0x{key}")
    }
}

fn check_url(name: &str, url: &str) -> Result<(), AgentError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(AgentError::Config(format!("{name} must start with http:// or https:// (got {url:?})")))
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, v: &str) -> Result<T, AgentError>
where
    T::Err: fmt::Display,
{
    v.parse::<T>()
        .map_err(|e| AgentError::Config(format!("{name}: {e}")))
}

fn parse_bool(name: &str, v: &str) -> Result<bool, AgentError> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::Config(format!("{name}: expected a boolean, got {v:?}"))),
    }
}

fn parse_address(name: &str, v: &str) -> Result<Address, AgentError> {
    v.parse::<Address>()
        .map_err(|e| AgentError::Config(format!("{name}: {e}")))
}

/// `KEY=VALUE` per line; `#` comments, optional `export ` and surrounding quotes.
pub fn parse_env_file(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let l = l.strip_prefix("export ").unwrap_or(l);
            let (k, v) = l.split_once('=')?;
            let v = v.trim().trim_matches('"').trim_matches('\'');
            Some((k.trim().to_string(), v.to_string()))
        })
        .collect()
}
