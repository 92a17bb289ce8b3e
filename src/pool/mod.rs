//! Connection pool module for Hostpool
//!
//! This module provides the pool cache and the manager that routes each
//! request URL to a per-endpoint connection pool.

mod connection;
mod container;
mod guard;
mod http_pool;
mod manager;
mod registry;

pub use connection::{IdleQueue, PooledConnection, Reusable};
pub use container::{RecentlyUsedContainer, CLEANUP_FACTOR};
pub use guard::ConnectionGuard;
#[cfg(feature = "rustls-tls")]
pub use http_pool::HttpsPool;
pub use http_pool::{HttpConnectionPool, HttpPool, HttpPoolFactory};
pub use manager::{PoolManager, PoolManagerBuilder, PoolStats, PoolStatsSnapshot};
pub use registry::SchemeRegistry;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Identity of a cached pool: `(scheme, host, port)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Lowercase URL scheme
    pub scheme: String,
    /// Lowercase host (IPv6 literals keep their brackets)
    pub host: String,
    /// Explicit or default port
    pub port: u16,
}

impl PoolKey {
    /// Create a key
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        PoolKey {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// A pool of reusable connections to one endpoint
///
/// The manager only dispatches through [`ConnectionPool::urlopen`] and
/// releases resources through [`ConnectionPool::close`]; everything else
/// about connections belongs to the implementation.
#[async_trait]
pub trait ConnectionPool: Debug + Send + Sync {
    /// Identity of this pool
    fn key(&self) -> &PoolKey;

    /// Host this pool connects to
    fn host(&self) -> &str {
        &self.key().host
    }

    /// Port this pool connects to
    fn port(&self) -> u16 {
        self.key().port
    }

    /// Perform one request/response exchange
    async fn urlopen(&self, request: Request) -> Result<Response>;

    /// Drop idle connections; the pool stays usable
    fn close(&self);
}

/// Constructor for the pool type registered under a scheme
pub trait PoolFactory: Debug + Send + Sync {
    /// Build a pool for `host:port` from the manager's pool configuration
    fn create(&self, host: &str, port: u16, config: &PoolConfig) -> Result<Arc<dyn ConnectionPool>>;
}
