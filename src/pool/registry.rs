//! Scheme registry
//!
//! Maps a URL scheme to its default port and the factory that builds pools
//! for it. Each manager owns its own registry, so overriding a default port
//! never leaks into other managers.

use super::http_pool::HttpPoolFactory;
use super::PoolFactory;
use crate::error::{HostpoolError, Result};
use crate::transport::TcpTransport;
#[cfg(feature = "rustls-tls")]
use crate::transport::TlsTransport;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct SchemeEntry {
    default_port: u16,
    factory: Arc<dyn PoolFactory>,
}

/// Scheme to pool-type table
#[derive(Debug, Clone)]
pub struct SchemeRegistry {
    entries: HashMap<String, SchemeEntry>,
}

impl Default for SchemeRegistry {
    /// `http` on port 80 and, with TLS enabled, `https` on port 443
    fn default() -> Self {
        let mut registry = SchemeRegistry::empty();
        registry.register("http", 80, Arc::new(HttpPoolFactory::<TcpTransport>::new()));
        #[cfg(feature = "rustls-tls")]
        registry.register("https", 443, Arc::new(HttpPoolFactory::<TlsTransport>::new()));
        registry
    }
}

impl SchemeRegistry {
    /// Registry with no schemes
    pub fn empty() -> Self {
        SchemeRegistry {
            entries: HashMap::new(),
        }
    }

    /// Register (or replace) the pool type for a scheme
    pub fn register(&mut self, scheme: &str, default_port: u16, factory: Arc<dyn PoolFactory>) {
        self.entries.insert(
            scheme.to_ascii_lowercase(),
            SchemeEntry {
                default_port,
                factory,
            },
        );
    }

    /// Change the default port of a registered scheme
    pub fn set_default_port(&mut self, scheme: &str, port: u16) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&scheme.to_ascii_lowercase())
            .ok_or_else(|| HostpoolError::UnregisteredScheme(scheme.to_string()))?;
        entry.default_port = port;
        Ok(())
    }

    /// Whether a scheme is registered
    pub fn contains(&self, scheme: &str) -> bool {
        self.entries.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Default port of a scheme
    pub fn default_port(&self, scheme: &str) -> Option<u16> {
        self.entries
            .get(&scheme.to_ascii_lowercase())
            .map(|e| e.default_port)
    }

    /// Pool factory of a scheme
    pub fn factory(&self, scheme: &str) -> Result<&Arc<dyn PoolFactory>> {
        self.entries
            .get(&scheme.to_ascii_lowercase())
            .map(|e| &e.factory)
            .ok_or_else(|| HostpoolError::UnregisteredScheme(scheme.to_string()))
    }
}
