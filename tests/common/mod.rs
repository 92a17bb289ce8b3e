//! Test utilities for Hostpool
//!
//! A small HTTP/1.1 server reachable under two host names (`127.0.0.1` and
//! `localhost`), so redirects between them cross pools.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::form_urlencoded;

/// Primary host name of the dummy server
pub const HOST: &str = "127.0.0.1";

/// Alternate host name of the same server; resolves to a different pool
pub const HOST_ALT: &str = "localhost";

type Attempts = Arc<Mutex<HashMap<String, usize>>>;

/// HTTP server with a handful of fixed endpoints
///
/// - `/` answers `Dummy server!`
/// - `/redirect?target=T` answers 303 to `T` (default `/`)
/// - `/redirect_loop` answers 302 to itself
/// - `/headers` answers the request headers as a JSON object
/// - `/status?status=500 Internal Server Error` answers that status
/// - `/echo` answers the query string, or the body for non-GET requests
/// - `/successful_retry` answers 418 on the first request per `test-name`
///   header value and 200 afterwards
pub struct DummyServer {
    /// Listening port
    pub port: u16,
    handle: JoinHandle<()>,
}

impl DummyServer {
    /// Bind to an ephemeral port and start serving
    pub async fn start() -> Self {
        let listener = TcpListener::bind((HOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let attempts: Attempts = Arc::default();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let attempts = Arc::clone(&attempts);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, Arc::clone(&attempts)));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        DummyServer { port, handle }
    }

    /// Base URL on the primary host
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", HOST, self.port)
    }

    /// Base URL on the alternate host
    pub fn base_url_alt(&self) -> String {
        format!("http://{}:{}", HOST_ALT, self.port)
    }

    /// URL of `path` on the primary host
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// URL of `path` on the alternate host
    pub fn url_alt(&self, path: &str) -> String {
        format!("{}{}", self.base_url_alt(), path)
    }
}

impl Drop for DummyServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn query_params(req: &Request<Incoming>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn handle(
    req: Request<Incoming>,
    attempts: Attempts,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let params = query_params(&req);

    let response = match req.uri().path() {
        "/" => respond(StatusCode::OK, "Dummy server!"),
        "/redirect" => {
            let target = params.get("target").map(String::as_str).unwrap_or("/");
            let mut response = respond(
                StatusCode::SEE_OTHER,
                format!("Redirecting to {}", target),
            );
            if let Ok(location) = HeaderValue::from_str(target) {
                response.headers_mut().insert(LOCATION, location);
            }
            response
        }
        "/redirect_loop" => {
            let mut response = respond(StatusCode::FOUND, "");
            response
                .headers_mut()
                .insert(LOCATION, HeaderValue::from_static("/redirect_loop"));
            response
        }
        "/headers" => {
            let headers: BTreeMap<String, String> = req
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let mut response = respond(
                StatusCode::OK,
                serde_json::to_vec(&headers).unwrap_or_default(),
            );
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        "/status" => {
            let code = params
                .get("status")
                .and_then(|s| s.split_whitespace().next())
                .and_then(|c| c.parse::<u16>().ok())
                .and_then(|c| StatusCode::from_u16(c).ok())
                .unwrap_or(StatusCode::OK);
            respond(code, "")
        }
        "/echo" => {
            if req.method() == hyper::Method::GET {
                respond(StatusCode::OK, req.uri().query().unwrap_or("").to_string())
            } else {
                let body = req
                    .into_body()
                    .collect()
                    .await
                    .map(|b| b.to_bytes())
                    .unwrap_or_default();
                respond(StatusCode::OK, body)
            }
        }
        "/successful_retry" => {
            let name = req
                .headers()
                .get("test-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let count = {
                let mut attempts = attempts.lock().unwrap();
                let count = attempts.entry(name).or_insert(0);
                *count += 1;
                *count
            };
            if count > 1 {
                respond(StatusCode::OK, "Retry successful!")
            } else {
                respond(StatusCode::IM_A_TEAPOT, "")
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

/// Parse the JSON body of a `/headers` response
pub fn echoed_headers(body: &[u8]) -> HashMap<String, String> {
    serde_json::from_slice(body).unwrap()
}
