//! Ledger configuration
//!
//! Every section has defaults, so a JSON file only needs the fields it
//! overrides.

use crate::core::block::BLOCK_VERSION;
use crate::core::consensus::MAX_BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default per-hop timeout for reorg fetches
pub const DEFAULT_HOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default coinbase reward
pub const DEFAULT_BLOCK_REWARD: u64 = 10_000;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub consensus: ConsensusConfig,
    pub reorg: ReorgConfig,
    pub mining: MiningConfig,
}

impl LedgerConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Block-level consensus parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Maximum storage size of a block in bytes
    pub max_block_size: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

/// Reorg resolver parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorgConfig {
    /// Give up on a fetch after this long; `None` waits forever
    pub hop_timeout: Option<Duration>,
}

impl Default for ReorgConfig {
    fn default() -> Self {
        Self {
            hop_timeout: Some(DEFAULT_HOP_TIMEOUT),
        }
    }
}

/// Miner parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Nonces tried before giving up on a candidate
    pub max_attempts: u64,
    /// Version written into mined blocks
    pub version: u32,
    /// Coinbase reward paid to the miner
    pub block_reward: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1 << 32,
            version: BLOCK_VERSION,
            block_reward: DEFAULT_BLOCK_REWARD,
        }
    }
}
