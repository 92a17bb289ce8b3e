//! Retry policy
//!
//! A [`Retry`] value carries the remaining retry and redirect budgets of one
//! logical request. It is never mutated in place: every consumed attempt
//! produces a new value through [`Retry::increment`], so a policy passed to
//! the manager can be reused for other requests.

use crate::error::{HostpoolError, MaxRetriesReason, Result};
use hyper::Method;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Headers removed on a cross-host redirect unless configured otherwise
pub const DEFAULT_REMOVE_HEADERS_ON_REDIRECT: &[&str] = &["authorization"];

/// Default total retry budget
pub const DEFAULT_TOTAL: u32 = 3;

/// Upper bound for computed backoff delays
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(120);

/// What consumed one unit of the retry budget
#[derive(Debug)]
pub enum RetryCause {
    /// A network-level failure from the pool
    Error(HostpoolError),
    /// A redirect response that is about to be followed
    Redirect {
        /// Status of the redirect response
        status: u16,
        /// Absolute target of the redirect
        location: String,
    },
    /// A response whose status is in the forcelist
    Status(u16),
}

/// One consumed attempt, kept on the policy for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHistory {
    /// Method of the attempt
    pub method: Method,
    /// URL of the attempt
    pub url: String,
    /// Error message, if the attempt failed at the network level
    pub error: Option<String>,
    /// Response status, if one was received
    pub status: Option<u16>,
    /// Redirect target, if the attempt was redirected
    pub redirect_location: Option<String>,
}

/// Retry configuration for a single logical request
///
/// Counters set to `None` are unbounded; `total` bounds all of them together.
#[derive(Debug, Clone)]
pub struct Retry {
    /// Overall number of retries allowed
    pub total: Option<u32>,
    /// Retries allowed for connection-setup errors
    pub connect: Option<u32>,
    /// Retries allowed for errors after the request was sent
    pub read: Option<u32>,
    /// Redirects allowed
    pub redirect: Option<u32>,
    /// Retries allowed for forcelisted statuses
    pub status: Option<u32>,
    /// Statuses that force a retry
    pub status_forcelist: HashSet<u16>,
    /// Methods considered idempotent enough to retry
    pub allowed_methods: HashSet<Method>,
    /// Raise when the redirect budget runs out instead of returning the 3xx
    pub raise_on_redirect: bool,
    /// Raise when the status budget runs out instead of returning the response
    pub raise_on_status: bool,
    /// Lowercased header names stripped on a cross-host redirect
    pub remove_headers_on_redirect: HashSet<String>,
    /// Multiplier for exponential backoff between consecutive failures
    pub backoff_factor: f64,
    /// Cap for computed backoff delays
    pub backoff_max: Duration,
    /// Attempts consumed so far
    pub history: Vec<RequestHistory>,
    disabled: bool,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            total: Some(DEFAULT_TOTAL),
            connect: None,
            read: None,
            redirect: None,
            status: None,
            status_forcelist: HashSet::new(),
            allowed_methods: default_allowed_methods(),
            raise_on_redirect: true,
            raise_on_status: true,
            remove_headers_on_redirect: DEFAULT_REMOVE_HEADERS_ON_REDIRECT
                .iter()
                .map(|h| h.to_string())
                .collect(),
            backoff_factor: 0.0,
            backoff_max: DEFAULT_BACKOFF_MAX,
            history: Vec::new(),
            disabled: false,
        }
    }
}

impl From<u32> for Retry {
    fn from(total: u32) -> Self {
        Retry::from_count(total)
    }
}

fn default_allowed_methods() -> HashSet<Method> {
    [
        Method::HEAD,
        Method::GET,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
        Method::TRACE,
    ]
    .into_iter()
    .collect()
}

/// Take one unit from a counter; returns true when the counter was already spent
fn consume(counter: &mut Option<u32>) -> bool {
    match counter {
        Some(0) => true,
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

impl Retry {
    /// Create a policy with the given overall budget
    pub fn new(total: Option<u32>) -> Self {
        Retry {
            total,
            ..Default::default()
        }
    }

    /// Create a policy allowing `total` retries and redirects
    pub fn from_count(total: u32) -> Self {
        Retry::new(Some(total))
    }

    /// No retries at all; redirects are returned instead of followed and
    /// network errors surface unchanged
    pub fn disabled() -> Self {
        Retry {
            total: Some(0),
            redirect: Some(0),
            raise_on_redirect: false,
            raise_on_status: false,
            disabled: true,
            ..Default::default()
        }
    }

    /// Set the redirect budget
    pub fn with_redirect(mut self, redirect: Option<u32>) -> Self {
        self.redirect = redirect;
        self
    }

    /// Set the connect-error budget
    pub fn with_connect(mut self, connect: Option<u32>) -> Self {
        self.connect = connect;
        self
    }

    /// Set the read-error budget
    pub fn with_read(mut self, read: Option<u32>) -> Self {
        self.read = read;
        self
    }

    /// Set the forcelisted-status budget
    pub fn with_status(mut self, status: Option<u32>) -> Self {
        self.status = status;
        self
    }

    /// Set the statuses that force a retry
    pub fn with_status_forcelist<I: IntoIterator<Item = u16>>(mut self, statuses: I) -> Self {
        self.status_forcelist = statuses.into_iter().collect();
        self
    }

    /// Set the methods that may be retried
    pub fn with_allowed_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    /// Choose between raising and returning the last 3xx when redirects run out
    pub fn with_raise_on_redirect(mut self, raise: bool) -> Self {
        self.raise_on_redirect = raise;
        self
    }

    /// Choose between raising and returning the last response when status
    /// retries run out
    pub fn with_raise_on_status(mut self, raise: bool) -> Self {
        self.raise_on_status = raise;
        self
    }

    /// Replace the set of headers stripped on cross-host redirects
    pub fn with_remove_headers_on_redirect<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove_headers_on_redirect = headers
            .into_iter()
            .map(|h| h.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Set the exponential backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Whether redirects may be followed at all
    pub fn follows_redirects(&self) -> bool {
        !self.disabled
    }

    /// Whether a header is stripped on cross-host redirects
    pub fn removes_header_on_redirect(&self, name: &str) -> bool {
        self.remove_headers_on_redirect
            .contains(&name.to_ascii_lowercase())
    }

    /// Whether the method may be retried
    pub fn is_method_retryable(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Whether a response with this status should be retried
    pub fn is_retry(&self, method: &Method, status: u16) -> bool {
        self.is_method_retryable(method) && self.status_forcelist.contains(&status)
    }

    /// Consume one attempt
    ///
    /// Returns the updated policy, or [`HostpoolError::MaxRetries`] once a
    /// relevant counter is spent. Errors that must not be retried (any
    /// error on a disabled policy, read errors on non-retryable methods)
    /// come back unchanged.
    pub fn increment(&self, method: &Method, url: &str, cause: RetryCause) -> Result<Retry> {
        let mut next = self.clone();
        let mut exhausted = consume(&mut next.total);

        let (reason, entry) = match cause {
            RetryCause::Error(err) => {
                if self.disabled {
                    return Err(err);
                }
                if err.is_connect_error() {
                    exhausted |= consume(&mut next.connect);
                } else if err.is_read_error() {
                    if !self.is_method_retryable(method) {
                        return Err(err);
                    }
                    exhausted |= consume(&mut next.read);
                } else {
                    return Err(err);
                }
                let message = err.to_string();
                (
                    MaxRetriesReason::Error(message.clone()),
                    RequestHistory {
                        method: method.clone(),
                        url: url.to_string(),
                        error: Some(message),
                        status: None,
                        redirect_location: None,
                    },
                )
            }
            RetryCause::Redirect { status, location } => {
                exhausted |= consume(&mut next.redirect);
                (
                    MaxRetriesReason::TooManyRedirects,
                    RequestHistory {
                        method: method.clone(),
                        url: url.to_string(),
                        error: None,
                        status: Some(status),
                        redirect_location: Some(location),
                    },
                )
            }
            RetryCause::Status(status) => {
                exhausted |= consume(&mut next.status);
                (
                    MaxRetriesReason::TooManyErrorResponses(status),
                    RequestHistory {
                        method: method.clone(),
                        url: url.to_string(),
                        error: None,
                        status: Some(status),
                        redirect_location: None,
                    },
                )
            }
        };

        next.history.push(entry);

        if exhausted {
            return Err(HostpoolError::MaxRetries {
                url: url.to_string(),
                reason,
            });
        }

        debug!(
            "Incremented retry for (url='{}'): total={:?} redirect={:?}",
            url, next.total, next.redirect
        );
        Ok(next)
    }

    /// Number of trailing history entries that were failures rather than redirects
    fn consecutive_errors(&self) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|h| h.redirect_location.is_none())
            .count()
    }

    /// Delay before the next attempt
    pub fn get_backoff_time(&self) -> Duration {
        let consecutive = self.consecutive_errors();
        if consecutive <= 1 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }

        // Clamp before converting: a huge or infinite value would not fit a Duration
        let exponent = i32::try_from(consecutive - 1).unwrap_or(i32::MAX);
        let secs = (self.backoff_factor * 2f64.powi(exponent)).min(self.backoff_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Sleep for the backoff delay, if any
    pub async fn sleep(&self) {
        let delay = self.get_backoff_time();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
