//! Transport module for Hostpool
//!
//! This module provides the stream layer beneath the connection pools:
//! plain TCP for `http` and rustls TLS for `https`.

mod tcp;
#[cfg(feature = "rustls-tls")]
mod tls;

pub use tcp::TcpTransport;
#[cfg(feature = "rustls-tls")]
pub use tls::{TlsStream, TlsTransport};

use crate::config::{PoolConfig, TcpConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Strip the brackets `url` keeps around IPv6 literals
pub fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Transport trait for the stream beneath a connection pool
///
/// Implementations open one fresh stream per call; reuse is the pool's job.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// The stream type produced by this transport
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Scheme served by this transport
    const SCHEME: &'static str;

    /// Port implied when a URL for this transport omits one
    const DEFAULT_PORT: u16;

    /// Create a new transport instance from pool configuration
    fn new(config: &PoolConfig) -> Result<Self>
    where
        Self: Sized;

    /// Connect to `host:port`
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream>;
}
