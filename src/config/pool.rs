//! Connection pool configuration
//!
//! Defines the settings forwarded to every connection pool the manager creates.

use super::{TcpConfig, TlsConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of idle connections kept per pool
fn default_max_idle_connections() -> usize {
    1
}

/// Default connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Default read timeout in seconds
fn default_read_timeout() -> u64 {
    30
}

/// Default idle timeout in seconds
fn default_idle_timeout() -> u64 {
    90
}

/// Connection pool configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle connections kept for reuse
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,

    /// Connection setup timeout in seconds (TCP connect plus TLS handshake)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Timeout in seconds for a single request/response exchange
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    /// Idle connections older than this many seconds are discarded
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,

    /// TLS settings, only used by `https` pools
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_idle_connections: default_max_idle_connections(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            idle_timeout: default_idle_timeout(),
            tcp: TcpConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.read_timeout == 0 {
            return Err("read_timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    /// Idle timeout as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}
