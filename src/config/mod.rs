//! Configuration module for Hostpool
//!
//! This module provides configuration types and parsing for the pool manager
//! and the connection pools it creates.

mod manager;
mod pool;
mod transport;

pub use manager::ManagerConfig;
pub use pool::PoolConfig;
pub use transport::{TcpConfig, TlsConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Pool manager configuration
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Configuration forwarded to every created connection pool
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.manager.validate()?;
        self.pool.validate()
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}
