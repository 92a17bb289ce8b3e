//! TCP transport implementation
//!
//! Provides plain TCP connections for `http` pools.

use super::{unbracket, SocketOpts, Transport};
use crate::config::PoolConfig;
use crate::error::{HostpoolError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP transport for plain connections
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a new TCP transport with default options
    pub fn with_defaults() -> Self {
        TcpTransport {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Open a TCP stream with the configured timeout and socket options
    pub(crate) async fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        let target = unbracket(host);

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((target, port)))
            .await
            .map_err(|_| {
                HostpoolError::Connect(format!("Connection timeout to {}:{}", host, port))
            })?
            .map_err(|e| {
                HostpoolError::Connect(format!("Failed to connect to {}:{}: {}", host, port, e))
            })?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!("TCP connection established to {}:{}", host, port);

        Ok(stream)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    const SCHEME: &'static str = "http";

    const DEFAULT_PORT: u16 = 80;

    fn new(config: &PoolConfig) -> Result<Self> {
        Ok(TcpTransport {
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
            connect_timeout: config.connect_timeout(),
        })
    }

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream> {
        self.connect_tcp(host, port).await
    }
}
