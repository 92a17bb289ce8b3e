//! # Hostpool - Per-Host HTTP Connection Pool Manager
//!
//! Hostpool keeps one connection pool per `(scheme, host, port)` and caches
//! a bounded number of them, discarding the least recently used pool when
//! the bound is exceeded. Requests go through a [`PoolManager`], which
//! resolves the pool for each URL and follows redirects across pools.
//!
//! ## Features
//!
//! - **Bounded Pool Cache**: LRU eviction with lazily invalidated heap entries
//! - **Scheme Registry**: `http` and `https` pools, extensible per manager
//! - **Redirect Handling**: cross-host redirects strip sensitive headers
//! - **Retry Policy**: redirect, error and status budgets with backoff
//! - **Scoped Cleanup**: every cached pool is closed when a scope ends
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hostpool::{PoolManager, RequestOptions};
//! use hyper::Method;
//!
//! #[tokio::main]
//! async fn main() -> hostpool::Result<()> {
//!     let manager = PoolManager::new();
//!     let response = manager
//!         .request(Method::GET, "http://example.com/", RequestOptions::new())
//!         .await?;
//!     println!("{} {}", response.status(), response.text());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! caller -> PoolManager -> RecentlyUsedContainer<PoolKey, pool> -> HttpConnectionPool -> Transport
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod pool;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{HostpoolError, MaxRetriesReason, Result};
pub use pool::{ConnectionPool, PoolKey, PoolManager, PoolManagerBuilder, RecentlyUsedContainer};
pub use request::{Request, RequestOptions};
pub use response::Response;
pub use retry::Retry;

/// Version of the Hostpool library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
