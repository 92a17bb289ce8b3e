//! Transport configuration types
//!
//! Defines socket and TLS settings used when pools open connections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

/// Default nodelay setting
fn default_nodelay() -> bool {
    true
}

/// TCP socket configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

/// Default certificate verification setting
fn default_verify() -> bool {
    true
}

/// TLS configuration for `https` pools
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TlsConfig {
    /// Verify the server certificate chain and hostname
    #[serde(default = "default_verify")]
    pub verify: bool,

    /// PEM bundle of additional trusted roots
    #[serde(default)]
    pub ca_certs: Option<PathBuf>,

    /// Directory of PEM files with additional trusted roots
    #[serde(default)]
    pub ca_cert_dir: Option<PathBuf>,

    /// Name to verify instead of the pool host (SNI override)
    #[serde(default)]
    pub server_hostname: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            verify: default_verify(),
            ca_certs: None,
            ca_cert_dir: None,
            server_hostname: None,
        }
    }
}
