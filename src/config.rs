//! Demo configuration
//!
//! Read from a JSON file (`TOKEN_DEMO_CONFIG`, default `token-demo.json`)
//! with a handful of environment overrides.

use crate::demo::TokenPlan;
use crate::ledger::LedgerConfig;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use web3::types::U256;

pub const DEFAULT_CONFIG_PATH: &str = "token-demo.json";

/// One node of the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// JSON-RPC endpoint
    pub url: String,
    /// Enclave key this node's transaction manager advertises
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Creator first, outsider last
    pub nodes: Vec<NodeConfig>,
    pub token: TokenPlan,
    /// Hex file holding the compiled token bytecode
    pub bytecode_path: Option<PathBuf>,
    pub gas_limit: u64,
    pub receipt_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Use the in-memory ledger instead of live nodes
    pub simulate: bool,
    /// Independent runs executed concurrently
    pub runs: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            token: TokenPlan::default(),
            bytecode_path: None,
            gas_limit: 4_700_000,
            receipt_timeout_secs: 30,
            poll_interval_ms: 1_000,
            simulate: false,
            runs: 1,
        }
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl DemoConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Loads the configured file and applies environment overrides
    pub fn from_env() -> Result<Self> {
        let path = env::var("TOKEN_DEMO_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(Path::new(&path))?;

        if let Some(simulate) = env_override("TOKEN_DEMO_SIMULATE") {
            config.simulate = simulate;
        }
        if let Some(timeout) = env_override("TOKEN_DEMO_RECEIPT_TIMEOUT") {
            config.receipt_timeout_secs = timeout;
        }
        if let Some(runs) = env_override("TOKEN_DEMO_RUNS") {
            config.runs = runs;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("at least one node must be configured");
        }
        if let Some(node) = self.nodes.iter().find(|n| n.public_key.trim().is_empty()) {
            bail!("node {} has no public key", node.name);
        }
        if self.runs == 0 {
            bail!("runs must be at least 1");
        }
        if !self.simulate && self.bytecode_path.is_none() {
            bail!("bytecode_path is required unless simulating");
        }
        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            gas_limit: U256::from(self.gas_limit),
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Compiled token bytecode, empty when none is configured
    pub fn load_bytecode(&self) -> Result<Vec<u8>> {
        let Some(path) = &self.bytecode_path else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading bytecode {}", path.display()))?;
        let trimmed = raw.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        hex::decode(hex_str).map_err(|e| anyhow!("invalid bytecode in {}: {}", path.display(), e))
    }
}
