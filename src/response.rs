//! Buffered HTTP response
//!
//! Pools read the whole body before handing the response back, so the
//! connection can return to the idle queue right away.

use crate::pool::PoolKey;
use crate::retry::RequestHistory;
use bytes::Bytes;
use hyper::header::{HeaderMap, LOCATION};
use hyper::StatusCode;

/// Statuses that carry a redirect target in `Location`
pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// A fully-read HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// URL that produced this response
    pub url: String,
    /// Key of the pool that served the request
    pub pool: PoolKey,
    /// Attempts consumed by the manager before this response
    pub history: Vec<RequestHistory>,
}

impl Response {
    /// Status code as a number
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Response body
    pub fn data(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// First value of a header, if it is valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Host of the pool that served the request
    pub fn host(&self) -> &str {
        &self.pool.host
    }

    /// Whether the status is a redirect status
    pub fn is_redirect(&self) -> bool {
        REDIRECT_STATUSES.contains(&self.status())
    }

    /// Redirect target when this is a redirect response with a `Location`
    pub fn get_redirect_location(&self) -> Option<&str> {
        if !self.is_redirect() {
            return None;
        }
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}
