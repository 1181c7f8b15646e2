//! Chain parameters

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::Path;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Mining reward must be a positive finite number, got {0}")]
    InvalidMiningReward(f64),
}

/// Difficulty and reward for a [`Blockchain`](crate::blockchain::Blockchain)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Leading zero hex digits required in a mined block hash
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,

    /// Amount credited to the miner of each block
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
}

fn default_difficulty() -> usize {
    2
}

fn default_mining_reward() -> f64 {
    100.0
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
        }
    }
}

impl ChainConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mining_reward.is_finite() || self.mining_reward <= 0.0 {
            return Err(ConfigError::InvalidMiningReward(self.mining_reward));
        }
        Ok(())
    }
}
