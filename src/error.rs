//! Error types for Hostpool
//!
//! This module defines all custom error types used throughout the library.

use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for Hostpool operations
#[derive(Error, Debug)]
pub enum HostpoolError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The URL could not be parsed or has no host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A header name or value is not valid HTTP
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// No pool type is registered for the URL scheme
    #[error("Unregistered scheme: {0}")]
    UnregisteredScheme(String),

    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connect(String),

    /// TLS setup or handshake error
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP exchange failed after the connection was established
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A retry or redirect budget was exhausted
    #[error("Max retries exceeded with url: {url} (caused by {reason})")]
    MaxRetries {
        /// URL of the request that exhausted the budget
        url: String,
        /// What consumed the last unit of the budget
        reason: MaxRetriesReason,
    },
}

impl HostpoolError {
    /// Whether the error happened before any bytes of the request were sent
    pub fn is_connect_error(&self) -> bool {
        matches!(self, HostpoolError::Connect(_) | HostpoolError::Tls(_))
    }

    /// Whether the error happened while waiting for or reading a response
    pub fn is_read_error(&self) -> bool {
        matches!(self, HostpoolError::Protocol(_) | HostpoolError::Timeout(_))
    }
}

/// Cause recorded on [`HostpoolError::MaxRetries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaxRetriesReason {
    /// The redirect budget ran out
    TooManyRedirects,
    /// The server kept answering with a status from the forcelist
    TooManyErrorResponses(u16),
    /// A network-level failure that was retried until the budget ran out
    Error(String),
}

impl fmt::Display for MaxRetriesReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxRetriesReason::TooManyRedirects => write!(f, "too many redirects"),
            MaxRetriesReason::TooManyErrorResponses(status) => {
                write!(f, "too many {} error responses", status)
            }
            MaxRetriesReason::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, HostpoolError>;
