//! Request options
//!
//! [`RequestOptions`] carries everything `PoolManager::request` accepts on
//! top of the method and URL. [`Request`] is the single exchange handed to a
//! connection pool.

use crate::error::{HostpoolError, Result};
use crate::retry::Retry;
use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::Method;
use url::{form_urlencoded, Url};

/// Content type used for form-encoded bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A single request dispatched through one pool
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute target URL
    pub url: Url,
    /// Outgoing headers (`Host` is added by the pool)
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request with no headers and no body
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Path and query in origin-form
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// Options for `PoolManager::request`
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Form fields, encoded into the query or the body depending on the method
    pub fields: Vec<(String, String)>,
    /// Headers for this request; `None` uses the manager's default headers
    pub headers: Option<HeaderMap>,
    /// Explicit body
    pub body: Option<Bytes>,
    /// Follow redirects
    pub redirect: bool,
    /// Retry policy; `None` uses the default policy
    pub retries: Option<Retry>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            fields: Vec::new(),
            headers: None,
            body: None,
            redirect: true,
            retries: None,
        }
    }
}

impl RequestOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a form field
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a header, replacing the manager's defaults for this request
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HostpoolError::InvalidHeader(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HostpoolError::InvalidHeader(format!("{}: {}", name, e)))?;
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(name, value);
        Ok(self)
    }

    /// Set all headers at once
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set an explicit body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Enable or disable redirect following
    pub fn redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }

    /// Set the retry policy
    pub fn retries(mut self, retries: impl Into<Retry>) -> Self {
        self.retries = Some(retries.into());
        self
    }
}

/// Whether fields go into the URL rather than the body
pub fn encodes_fields_in_url(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS
    )
}

/// Encode form fields into `request`
///
/// Query-style methods get the fields appended to the query string. Other
/// methods get a form body, unless an explicit body is already set.
pub fn encode_fields(request: &mut Request, fields: &[(String, String)]) {
    if fields.is_empty() {
        return;
    }

    if encodes_fields_in_url(&request.method) {
        request.url.query_pairs_mut().extend_pairs(fields);
        return;
    }

    if request.body.is_some() {
        return;
    }

    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    request.body = Some(Bytes::from(encoded));
    if !request.headers.contains_key(CONTENT_TYPE) {
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    }
}

/// Convert string pairs (e.g. from configuration) into a header map
pub fn header_map<'a, I>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HostpoolError::InvalidHeader(format!("{}: {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| HostpoolError::InvalidHeader(format!("{}: {}", name, e)))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}
