//! HTTP connection pool implementation
//!
//! Keeps reusable HTTP/1.1 connections to a single `scheme://host:port` and
//! performs one request/response exchange per `urlopen` call.

use super::connection::{IdleQueue, PooledConnection};
use super::guard::ConnectionGuard;
use super::{ConnectionPool, PoolFactory, PoolKey};
use crate::config::PoolConfig;
use crate::error::{HostpoolError, Result};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{TcpTransport, Transport};
#[cfg(feature = "rustls-tls")]
use crate::transport::TlsTransport;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderValue, HOST};
use hyper_util::rt::TokioIo;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type Sender = SendRequest<Full<Bytes>>;

/// Pool of HTTP/1.1 connections over transport `T`
#[derive(Debug)]
pub struct HttpConnectionPool<T: Transport> {
    /// Identity of this pool
    key: PoolKey,
    /// Transport for opening connections
    transport: T,
    /// Connections waiting for reuse
    idle: IdleQueue<Sender>,
    /// Bound for one exchange
    read_timeout: Duration,
    /// Connections opened so far
    num_connections: AtomicUsize,
    /// Requests dispatched so far
    num_requests: AtomicUsize,
}

/// Plain `http` pool
pub type HttpPool = HttpConnectionPool<TcpTransport>;

/// TLS `https` pool
#[cfg(feature = "rustls-tls")]
pub type HttpsPool = HttpConnectionPool<TlsTransport>;

impl<T: Transport> HttpConnectionPool<T> {
    /// Create a pool for `host:port`
    pub fn new(host: &str, port: u16, config: &PoolConfig) -> Result<Self> {
        Ok(HttpConnectionPool {
            key: PoolKey::new(T::SCHEME, host, port),
            transport: T::new(config)?,
            idle: IdleQueue::new(config.max_idle_connections, config.idle_timeout()),
            read_timeout: config.read_timeout(),
            num_connections: AtomicUsize::new(0),
            num_requests: AtomicUsize::new(0),
        })
    }

    /// Connections opened so far
    pub fn num_connections(&self) -> usize {
        self.num_connections.load(Ordering::Relaxed)
    }

    /// Requests dispatched so far
    pub fn num_requests(&self) -> usize {
        self.num_requests.load(Ordering::Relaxed)
    }

    /// Connections currently idle
    pub fn num_idle(&self) -> usize {
        self.idle.len()
    }

    /// Value of the `Host` header; the port is omitted when it is the default
    pub fn host_header(&self) -> String {
        if self.key.port == T::DEFAULT_PORT {
            self.key.host.clone()
        } else {
            format!("{}:{}", self.key.host, self.key.port)
        }
    }

    /// Open a new connection and drive it on a background task
    async fn new_connection(&self) -> Result<Sender> {
        let count = self.num_connections.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Starting new {} connection ({}): {}:{}",
            T::SCHEME.to_uppercase(),
            count,
            self.key.host,
            self.key.port
        );

        let stream = self.transport.connect(&self.key.host, self.key.port).await?;
        let (sender, connection) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
            .await
            .map_err(|e| {
                HostpoolError::Connect(format!("HTTP handshake with {} failed: {}", self.key, e))
            })?;

        let key = self.key.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Connection to {} closed: {}", key, e);
            }
        });

        Ok(sender)
    }

    /// Reuse an idle connection, or open a new one
    async fn acquire(&self) -> Result<ConnectionGuard<'_, Sender>> {
        while let Some(mut conn) = self.idle.checkout() {
            // The peer may have closed it since it was returned
            if conn.sender_mut().ready().await.is_ok() {
                debug!("Reusing connection to {}", self.key);
                return Ok(ConnectionGuard::new(conn, &self.idle));
            }
        }

        let mut sender = self.new_connection().await?;
        sender
            .ready()
            .await
            .map_err(|e| HostpoolError::Connect(format!("Connection to {} not ready: {}", self.key, e)))?;
        Ok(ConnectionGuard::new(PooledConnection::new(sender), &self.idle))
    }

    /// Convert a [`Request`] into an origin-form hyper request
    fn build_request(&self, request: &Request) -> Result<hyper::Request<Full<Bytes>>> {
        let body = request.body.clone().unwrap_or_default();
        let mut http_request = hyper::Request::builder()
            .method(request.method.clone())
            .uri(request.target())
            .body(Full::new(body))
            .map_err(|e| HostpoolError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        *http_request.headers_mut() = request.headers.clone();
        if !http_request.headers().contains_key(HOST) {
            let host = HeaderValue::from_str(&self.host_header())
                .map_err(|e| HostpoolError::InvalidHeader(format!("Host: {}", e)))?;
            http_request.headers_mut().insert(HOST, host);
        }

        Ok(http_request)
    }
}

#[async_trait]
impl<T: Transport> ConnectionPool for HttpConnectionPool<T> {
    fn key(&self) -> &PoolKey {
        &self.key
    }

    async fn urlopen(&self, request: Request) -> Result<Response> {
        self.num_requests.fetch_add(1, Ordering::Relaxed);
        let http_request = self.build_request(&request)?;

        let mut conn = self.acquire().await?;
        let exchange = async {
            let response = conn
                .send_request(http_request)
                .await
                .map_err(|e| HostpoolError::Protocol(format!("{} {}: {}", request.method, request.url, e)))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| HostpoolError::Protocol(format!("Failed to read body: {}", e)))?
                .to_bytes();
            Ok::<_, HostpoolError>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(self.read_timeout, exchange)
            .await
            .map_err(|_| {
                HostpoolError::Timeout(format!(
                    "Read timed out after {:?}: {}",
                    self.read_timeout, request.url
                ))
            })??;

        debug!(
            "{}://{} \"{} {}\" {} {}",
            self.key.scheme,
            self.host_header(),
            request.method,
            request.target(),
            parts.status.as_u16(),
            body.len()
        );
        conn.release();

        Ok(Response {
            status: parts.status,
            headers: parts.headers,
            body,
            url: request.url.to_string(),
            pool: self.key.clone(),
            history: Vec::new(),
        })
    }

    fn close(&self) {
        let dropped = self.idle.clear();
        if dropped > 0 {
            debug!("Closed {} idle connection(s) to {}", dropped, self.key);
        }
    }
}

/// Factory registering [`HttpConnectionPool`] over transport `T` for a scheme
#[derive(Debug)]
pub struct HttpPoolFactory<T> {
    _transport: PhantomData<fn() -> T>,
}

impl<T> HttpPoolFactory<T> {
    /// Create the factory
    pub fn new() -> Self {
        HttpPoolFactory {
            _transport: PhantomData,
        }
    }
}

impl<T> Default for HttpPoolFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> PoolFactory for HttpPoolFactory<T> {
    fn create(&self, host: &str, port: u16, config: &PoolConfig) -> Result<Arc<dyn ConnectionPool>> {
        Ok(Arc::new(HttpConnectionPool::<T>::new(host, port, config)?))
    }
}
