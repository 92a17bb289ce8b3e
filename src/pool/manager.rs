//! Pool manager
//!
//! Routes every request URL to the pool for its `(scheme, host, port)`,
//! creating pools on demand and caching at most `num_pools` of them. The
//! top-level [`PoolManager::request`] follows redirects across pools and
//! applies the retry policy.

use super::container::RecentlyUsedContainer;
use super::registry::SchemeRegistry;
use super::{ConnectionPool, PoolFactory, PoolKey};
use crate::config::{Config, PoolConfig};
use crate::error::{HostpoolError, Result};
use crate::request::{encode_fields, header_map, Request, RequestOptions};
use crate::response::Response;
use crate::retry::{Retry, RetryCause};
use hyper::header::{HeaderMap, HeaderName};
use hyper::Method;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

/// Default number of cached pools
pub const DEFAULT_NUM_POOLS: usize = 10;

/// Headers describing a body, dropped when a 303 turns the request into a GET
const BODY_HEADERS: &[&str] = &[
    "content-encoding",
    "content-language",
    "content-location",
    "content-type",
    "content-length",
    "digest",
    "last-modified",
];

type SharedPool = Arc<dyn ConnectionPool>;

/// Statistics for the pool manager
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Pools constructed
    pub pools_created: AtomicUsize,
    /// Lookups answered from the cache
    pub pools_reused: AtomicUsize,
    /// Pools evicted by the cache bound
    pub pools_evicted: AtomicUsize,
    /// Exchanges dispatched to pools
    pub requests: AtomicUsize,
    /// Redirects followed
    pub redirects: AtomicUsize,
    /// Retries after errors or forcelisted statuses
    pub retries: AtomicUsize,
}

impl PoolStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    fn record(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            pools_created: self.pools_created.load(Ordering::Relaxed),
            pools_reused: self.pools_reused.load(Ordering::Relaxed),
            pools_evicted: self.pools_evicted.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool manager statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PoolStatsSnapshot {
    pub pools_created: usize,
    pub pools_reused: usize,
    pub pools_evicted: usize,
    pub requests: usize,
    pub redirects: usize,
    pub retries: usize,
}

/// Builder for [`PoolManager`]
#[derive(Debug, Clone)]
pub struct PoolManagerBuilder {
    num_pools: usize,
    headers: HeaderMap,
    raw_headers: BTreeMap<String, String>,
    pool_config: PoolConfig,
    registry: SchemeRegistry,
    default_ports: Vec<(String, u16)>,
}

impl Default for PoolManagerBuilder {
    fn default() -> Self {
        PoolManagerBuilder {
            num_pools: DEFAULT_NUM_POOLS,
            headers: HeaderMap::new(),
            raw_headers: BTreeMap::new(),
            pool_config: PoolConfig::default(),
            registry: SchemeRegistry::default(),
            default_ports: Vec::new(),
        }
    }
}

impl PoolManagerBuilder {
    /// Builder seeded from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        PoolManagerBuilder {
            num_pools: config.manager.num_pools,
            raw_headers: config.manager.headers.clone(),
            pool_config: config.pool.clone(),
            default_ports: config
                .manager
                .default_ports
                .iter()
                .map(|(scheme, port)| (scheme.clone(), *port))
                .collect(),
            ..Default::default()
        }
    }

    /// Number of pools to cache
    pub fn num_pools(mut self, num_pools: usize) -> Self {
        self.num_pools = num_pools;
        self
    }

    /// Default headers for requests that supply none
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add one default header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.raw_headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Configuration forwarded to every created pool
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Replace the whole scheme registry
    pub fn registry(mut self, registry: SchemeRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register (or replace) a pool type for a scheme
    pub fn register(mut self, scheme: &str, default_port: u16, factory: Arc<dyn PoolFactory>) -> Self {
        self.registry.register(scheme, default_port, factory);
        self
    }

    /// Override the default port of a registered scheme
    pub fn default_port(mut self, scheme: &str, port: u16) -> Self {
        self.default_ports.push((scheme.to_string(), port));
        self
    }

    /// Build the manager
    pub fn build(self) -> Result<PoolManager> {
        let mut registry = self.registry;
        for (scheme, port) in &self.default_ports {
            registry.set_default_port(scheme, *port)?;
        }

        let mut headers = self.headers;
        headers.extend(header_map(&self.raw_headers)?);

        self.pool_config
            .validate()
            .map_err(HostpoolError::Config)?;

        Ok(PoolManager {
            headers,
            pool_config: self.pool_config,
            registry,
            pools: Mutex::new(RecentlyUsedContainer::new(self.num_pools)),
            stats: PoolStats::new(),
        })
    }
}

/// Allows for arbitrary requests while transparently keeping track of
/// necessary connection pools
///
/// Pools are cached in a [`RecentlyUsedContainer`] keyed by
/// `(scheme, host, port)`. The cache lock is held only for bookkeeping,
/// never while a pool performs network I/O.
///
/// Two tasks resolving the same unseen key at the same time may both
/// construct a pool; the later insert replaces the earlier one, which is
/// dropped once its holder finishes.
#[derive(Debug)]
pub struct PoolManager {
    headers: HeaderMap,
    pool_config: PoolConfig,
    registry: SchemeRegistry,
    pools: Mutex<RecentlyUsedContainer<PoolKey, SharedPool>>,
    stats: PoolStats,
}

impl Default for PoolManager {
    fn default() -> Self {
        PoolManager::new()
    }
}

impl PoolManager {
    /// Manager with default settings
    pub fn new() -> Self {
        let builder = PoolManagerBuilder::default();
        PoolManager {
            headers: builder.headers,
            pool_config: builder.pool_config,
            registry: builder.registry,
            pools: Mutex::new(RecentlyUsedContainer::new(builder.num_pools)),
            stats: PoolStats::new(),
        }
    }

    /// Start building a manager
    pub fn builder() -> PoolManagerBuilder {
        PoolManagerBuilder::default()
    }

    /// Build a manager from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        PoolManagerBuilder::from_config(config).build()
    }

    /// Default headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Scheme registry
    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    /// Manager statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Maximum number of cached pools
    pub fn num_pools(&self) -> usize {
        self.lock_pools().maxsize()
    }

    /// Number of pools currently cached
    pub fn len(&self) -> usize {
        self.lock_pools().len()
    }

    /// Whether no pools are cached
    pub fn is_empty(&self) -> bool {
        self.lock_pools().is_empty()
    }

    fn lock_pools(&self) -> MutexGuard<'_, RecentlyUsedContainer<PoolKey, SharedPool>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the pool key of a URL
    ///
    /// A URL without an explicit port gets the scheme's registered default.
    /// An explicit port is kept even when it equals the scheme's usual
    /// default, so `http://h:80/` stays on port 80 when `http` was
    /// registered with another default.
    pub fn pool_key(&self, url: &str) -> Result<PoolKey> {
        let parsed = parse_url(url)?;
        self.key_from_parsed(&parsed, explicit_port(url))
    }

    /// Resolve the pool key of a parsed URL
    ///
    /// `explicit` is the port written in the original input, which `Url`
    /// does not report when it matches the scheme's special default.
    fn key_from_parsed(&self, url: &Url, explicit: Option<u16>) -> Result<PoolKey> {
        let scheme = url.scheme().to_ascii_lowercase();
        let host = url
            .host_str()
            .ok_or_else(|| HostpoolError::InvalidUrl(format!("{}: missing host", url)))?
            .to_ascii_lowercase();

        let port = match url.port().or(explicit) {
            Some(port) => port,
            None => self
                .registry
                .default_port(&scheme)
                .ok_or_else(|| HostpoolError::UnregisteredScheme(scheme.clone()))?,
        };

        Ok(PoolKey::new(scheme, host, port))
    }

    /// Get the pool for a URL, creating and caching it if needed
    pub fn connection_from_url(&self, url: &str) -> Result<SharedPool> {
        let key = self.pool_key(url)?;
        self.connection_from_key(&key)
    }

    /// Same as [`connection_from_url`](Self::connection_from_url) for a parsed URL
    ///
    /// A parsed `Url` hides explicit ports equal to the scheme's special
    /// default (`:80`, `:443`), so those resolve like a missing port.
    pub fn connection_from_parsed(&self, url: &Url) -> Result<SharedPool> {
        let key = self.key_from_parsed(url, None)?;
        self.connection_from_key(&key)
    }

    /// Get the pool for a key, creating and caching it if needed
    pub fn connection_from_key(&self, key: &PoolKey) -> Result<SharedPool> {
        if let Some(pool) = self.lock_pools().get(key) {
            PoolStats::record(&self.stats.pools_reused);
            return Ok(Arc::clone(pool));
        }

        let factory = self.registry.factory(&key.scheme)?;
        let pool = factory.create(&key.host, key.port, &self.pool_config)?;
        PoolStats::record(&self.stats.pools_created);
        debug!("Created pool for {}", key);

        let evicted = self.lock_pools().insert(key.clone(), Arc::clone(&pool));
        for (evicted_key, evicted_pool) in evicted {
            PoolStats::record(&self.stats.pools_evicted);
            debug!("Evicting pool for {}", evicted_key);
            evicted_pool.close();
        }

        Ok(pool)
    }

    /// Build the outgoing request for `url` with the manager's defaults applied
    fn prepare(&self, method: Method, url: Url, options: &RequestOptions) -> Request {
        let mut request = Request::new(method, url);
        request.headers = options
            .headers
            .clone()
            .unwrap_or_else(|| self.headers.clone());
        request.body = options.body.clone();
        encode_fields(&mut request, &options.fields);
        request
    }

    /// Dispatch one exchange to the pool of `url`
    ///
    /// Redirects are not followed and no retry policy is applied.
    pub async fn urlopen(&self, method: Method, url: &str, options: RequestOptions) -> Result<Response> {
        let key = self.pool_key(url)?;
        let pool = self.connection_from_key(&key)?;
        let request = self.prepare(method, parse_url(url)?, &options);

        PoolStats::record(&self.stats.requests);
        pool.urlopen(request).await
    }

    /// Make a request, following redirects across pools
    ///
    /// Redirects to a different `(scheme, host, port)` resolve a new pool
    /// and drop the headers named by the retry policy. Every redirect and
    /// every retry consumes the policy's budget; when it runs out the call
    /// fails with [`HostpoolError::MaxRetries`] unless the policy asks for
    /// the last response instead.
    pub async fn request(&self, method: Method, url: &str, options: RequestOptions) -> Result<Response> {
        let key = self.pool_key(url)?;
        let mut retries = options.retries.clone().unwrap_or_default();
        let mut request = self.prepare(method, parse_url(url)?, &options);
        let mut pool = self.connection_from_key(&key)?;

        loop {
            PoolStats::record(&self.stats.requests);
            let url = request.url.to_string();

            let mut response = match pool.urlopen(request.clone()).await {
                Ok(response) => response,
                Err(e) if e.is_connect_error() || e.is_read_error() => {
                    warn!("Retrying after error on {}: {}", url, e);
                    retries = retries.increment(&request.method, &url, RetryCause::Error(e))?;
                    PoolStats::record(&self.stats.retries);
                    retries.sleep().await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if retries.is_retry(&request.method, response.status()) {
                let status = response.status();
                match retries.increment(&request.method, &url, RetryCause::Status(status)) {
                    Ok(next) => {
                        debug!("Retry: {} returned {}", url, status);
                        retries = next;
                        PoolStats::record(&self.stats.retries);
                        retries.sleep().await;
                        continue;
                    }
                    Err(e) if retries.raise_on_status => return Err(e),
                    Err(_) => {
                        response.history = retries.history;
                        return Ok(response);
                    }
                }
            }

            let location = response.get_redirect_location().map(str::to_string);
            let location = match location {
                Some(location) if options.redirect && retries.follows_redirects() => location,
                _ => {
                    response.history = retries.history;
                    return Ok(response);
                }
            };

            let target = request.url.join(&location).map_err(|e| {
                HostpoolError::InvalidUrl(format!("redirect location {}: {}", location, e))
            })?;

            let cause = RetryCause::Redirect {
                status: response.status(),
                location: target.to_string(),
            };
            retries = match retries.increment(&request.method, &url, cause) {
                Ok(next) => next,
                Err(e) if retries.raise_on_redirect => return Err(e),
                Err(_) => {
                    response.history = retries.history;
                    return Ok(response);
                }
            };

            info!("Redirecting {} -> {}", url, target);
            PoolStats::record(&self.stats.redirects);

            if response.status() == 303 && request.method != Method::HEAD {
                request.method = Method::GET;
                request.body = None;
                for name in BODY_HEADERS {
                    request.headers.remove(*name);
                }
            }

            if target.host_str() != request.url.host_str() {
                strip_headers(&mut request.headers, &retries);
            }

            // Relative references keep the current authority, port included
            let target_key = if has_authority(&location) {
                self.key_from_parsed(&target, explicit_port(&location))?
            } else {
                pool.key().clone()
            };
            if &target_key != pool.key() {
                pool = self.connection_from_key(&target_key)?;
            }
            request.url = target;
        }
    }

    /// Close every cached pool and empty the cache
    ///
    /// Pools still held by in-flight requests keep working until released.
    pub fn clear(&self) {
        let pools = self.lock_pools().clear();
        for pool in &pools {
            pool.close();
        }
        if !pools.is_empty() {
            debug!("Closed {} pool(s)", pools.len());
        }
    }

    /// Run `f` with this manager, clearing every pool when it finishes
    ///
    /// Cleanup also runs when `f` fails, panics, or the returned future is
    /// dropped before completion.
    pub async fn scoped<'a, F, Fut, R>(&'a self, f: F) -> R
    where
        F: FnOnce(&'a PoolManager) -> Fut,
        Fut: Future<Output = R> + 'a,
    {
        let _guard = ClearOnDrop(self);
        f(self).await
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        self.clear();
    }
}

struct ClearOnDrop<'a>(&'a PoolManager);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| HostpoolError::InvalidUrl(format!("{}: {}", url, e)))
}

/// Byte offset of the authority in `reference`, if it has one (`scheme://` or `//`)
fn authority_start(reference: &str) -> Option<usize> {
    if reference.starts_with("//") {
        return Some(2);
    }
    let (scheme, rest) = reference.split_once(':')?;
    let valid_scheme = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    (valid_scheme && rest.starts_with("//")).then_some(scheme.len() + 3)
}

fn has_authority(reference: &str) -> bool {
    authority_start(reference).is_some()
}

/// Port written in the authority of `reference`, if any
fn explicit_port(reference: &str) -> Option<u16> {
    let rest = &reference[authority_start(reference)?..];
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

    let port = match host_port.rfind(']') {
        Some(end) => host_port[end + 1..].strip_prefix(':')?,
        None => host_port.rsplit_once(':')?.1,
    };
    port.parse().ok()
}

/// Drop the headers the policy removes on cross-host redirects
fn strip_headers(headers: &mut HeaderMap, retries: &Retry) {
    let doomed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| retries.removes_header_on_redirect(name.as_str()))
        .cloned()
        .collect();
    for name in doomed {
        headers.remove(&name);
    }
}
