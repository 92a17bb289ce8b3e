//! Pool manager configuration
//!
//! Defines how many pools are cached and what every request carries by default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of cached pools
fn default_num_pools() -> usize {
    10
}

/// Pool manager configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManagerConfig {
    /// Number of connection pools to cache before discarding the least
    /// recently used one
    #[serde(default = "default_num_pools")]
    pub num_pools: usize,

    /// Headers sent with every request that does not supply its own
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Per-scheme default port overrides (e.g. `http = 8080`)
    #[serde(default)]
    pub default_ports: BTreeMap<String, u16>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            num_pools: default_num_pools(),
            headers: BTreeMap::new(),
            default_ports: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Validate the manager configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_pools == 0 {
            return Err("num_pools must be greater than 0".to_string());
        }
        if let Some((scheme, _)) = self.default_ports.iter().find(|(_, port)| **port == 0) {
            return Err(format!("default port for scheme '{}' cannot be 0", scheme));
        }
        Ok(())
    }
}
