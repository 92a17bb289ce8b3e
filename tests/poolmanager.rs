//! End-to-end tests for the pool manager against a local HTTP server

mod common;

use common::{echoed_headers, DummyServer, HOST, HOST_ALT};
use hostpool::config::PoolConfig;
use hostpool::{HostpoolError, MaxRetriesReason, PoolManager, RequestOptions, Retry};
use hyper::Method;
use std::path::PathBuf;
use std::sync::Arc;

fn get() -> Method {
    Method::GET
}

#[tokio::test]
async fn test_redirect() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url("/"))
                .redirect(false),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 303);

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", &server.url("/")),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    assert_eq!(r.data(), b"Dummy server!");
}

#[tokio::test]
async fn test_redirect_twice() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();
    let target = format!("{}?target={}", server.url("/redirect"), server.url("/"));

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", &target).redirect(false),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 303);

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", &target),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    assert_eq!(r.data(), b"Dummy server!");
    assert_eq!(r.history.len(), 2);
}

#[tokio::test]
async fn test_redirect_to_relative_url() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", "/redirect").redirect(false),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 303);

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", "/redirect"),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    assert_eq!(r.data(), b"Dummy server!");
}

#[tokio::test]
async fn test_cross_host_redirect() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();
    let cross_host = server.url_alt("/echo?a=b");

    let err = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", &cross_host).retries(Retry::from_count(0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HostpoolError::MaxRetries {
            reason: MaxRetriesReason::TooManyRedirects,
            ..
        }
    ));

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url_alt("/echo?a=b"))
                .retries(Retry::from_count(1)),
        )
        .await
        .unwrap();
    assert_eq!(r.host(), HOST_ALT);
    assert_eq!(r.text(), "a=b");
    assert_eq!(http.len(), 2);
}

#[tokio::test]
async fn test_too_many_redirects() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();
    let target = format!("{}?target={}", server.url("/redirect"), server.url("/"));

    let err = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", &target).retries(Retry::from_count(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HostpoolError::MaxRetries { .. }));

    let err = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &target)
                .retries(Retry::new(None).with_redirect(Some(1))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HostpoolError::MaxRetries { .. }));
}

#[tokio::test]
async fn test_redirect_loop_is_bounded() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let err = http
        .request(
            get(),
            &server.url("/redirect_loop"),
            RequestOptions::new().retries(Retry::new(None).with_redirect(Some(1))),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("too many redirects"));
}

#[tokio::test]
async fn test_raise_on_redirect() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();
    let target = format!("{}?target={}", server.url("/redirect"), server.url("/"));

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new().field("target", &target).retries(
                Retry::new(None)
                    .with_redirect(Some(1))
                    .with_raise_on_redirect(false),
            ),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 303);
}

#[tokio::test]
async fn test_raise_on_status() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();
    let options = || RequestOptions::new().field("status", "500 Internal Server Error");

    // Default: raise once the status budget is spent
    let err = http
        .request(
            get(),
            &server.url("/status"),
            options().retries(Retry::from_count(1).with_status_forcelist([500])),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HostpoolError::MaxRetries {
            reason: MaxRetriesReason::TooManyErrorResponses(500),
            ..
        }
    ));

    // Explicitly raise
    let err = http
        .request(
            get(),
            &server.url("/status"),
            options().retries(
                Retry::from_count(1)
                    .with_status_forcelist([500])
                    .with_raise_on_status(true),
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HostpoolError::MaxRetries { .. }));

    // Return the last response instead
    let r = http
        .request(
            get(),
            &server.url("/status"),
            options().retries(
                Retry::from_count(1)
                    .with_status_forcelist([500])
                    .with_raise_on_status(false),
            ),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 500);
}

#[tokio::test]
async fn test_status_retry_recovers() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/successful_retry"),
            RequestOptions::new()
                .header("test-name", "test_status_retry_recovers")
                .unwrap()
                .retries(Retry::from_count(1).with_status_forcelist([418])),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    assert_eq!(r.text(), "Retry successful!");
}

#[tokio::test]
async fn test_redirect_cross_host_remove_headers() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url_alt("/headers"))
                .header("Authorization", "foo")
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    let data = echoed_headers(r.data());
    assert!(!data.keys().any(|k| k.eq_ignore_ascii_case("authorization")));

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url_alt("/headers"))
                .header("authorization", "foo")
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    let data = echoed_headers(r.data());
    assert!(!data.keys().any(|k| k.eq_ignore_ascii_case("authorization")));
}

#[tokio::test]
async fn test_redirect_same_host_keeps_headers() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url("/headers"))
                .header("Authorization", "foo")
                .unwrap(),
        )
        .await
        .unwrap();
    let data = echoed_headers(r.data());
    assert_eq!(data.get("authorization").map(String::as_str), Some("foo"));
    assert_eq!(http.len(), 1);
}

#[tokio::test]
async fn test_redirect_cross_host_no_remove_headers() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url_alt("/headers"))
                .header("Authorization", "foo")
                .unwrap()
                .retries(Retry::default().with_remove_headers_on_redirect(Vec::<String>::new())),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    let data = echoed_headers(r.data());
    assert_eq!(data.get("authorization").map(String::as_str), Some("foo"));
}

#[tokio::test]
async fn test_redirect_cross_host_set_removed_headers() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            get(),
            &server.url("/redirect"),
            RequestOptions::new()
                .field("target", &server.url_alt("/headers"))
                .header("X-API-Secret", "foo")
                .unwrap()
                .header("Authorization", "bar")
                .unwrap()
                .retries(Retry::default().with_remove_headers_on_redirect(["X-API-Secret"])),
        )
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    let data = echoed_headers(r.data());
    assert!(!data.contains_key("x-api-secret"));
    assert_eq!(data.get("authorization").map(String::as_str), Some("bar"));
}

#[tokio::test]
async fn test_missing_port() {
    let server = DummyServer::start().await;

    // Without an explicit port the scheme's default applies
    let http = PoolManager::builder()
        .default_port("http", server.port)
        .build()
        .unwrap();

    let r = http
        .request(get(), &format!("http://{}/", HOST), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    assert_eq!(r.data(), b"Dummy server!");
    assert_eq!(r.pool.port, server.port);
}

#[tokio::test]
async fn test_headers() {
    let server = DummyServer::start().await;
    let http = PoolManager::builder().header("Foo", "bar").build().unwrap();

    let r = http
        .request(get(), &server.url("/headers"), RequestOptions::new())
        .await
        .unwrap();
    let data = echoed_headers(r.data());
    assert_eq!(data.get("foo").map(String::as_str), Some("bar"));

    let r = http
        .request(Method::POST, &server.url("/headers"), RequestOptions::new())
        .await
        .unwrap();
    let data = echoed_headers(r.data());
    assert_eq!(data.get("foo").map(String::as_str), Some("bar"));

    // Per-call headers replace the defaults
    let r = http
        .request(
            get(),
            &server.url("/headers"),
            RequestOptions::new().header("Baz", "quux").unwrap(),
        )
        .await
        .unwrap();
    let data = echoed_headers(r.data());
    assert_eq!(data.get("foo"), None);
    assert_eq!(data.get("baz").map(String::as_str), Some("quux"));
}

#[tokio::test]
async fn test_http_with_tls_settings() {
    let server = DummyServer::start().await;

    // TLS settings do not affect plain http pools
    let mut pool_config = PoolConfig::default();
    pool_config.tls.ca_certs = Some(PathBuf::from("REQUIRED"));
    pool_config.tls.ca_cert_dir = Some(PathBuf::from("/nosuchdir"));
    let http = PoolManager::builder()
        .pool_config(pool_config)
        .build()
        .unwrap();

    let r = http
        .request(get(), &server.url("/"), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(r.status(), 200);
    assert_eq!(r.data(), b"Dummy server!");
}

#[tokio::test]
async fn test_post_fields_in_body() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let r = http
        .request(
            Method::POST,
            &server.url("/echo"),
            RequestOptions::new().field("a", "1").field("b", "two words"),
        )
        .await
        .unwrap();
    assert_eq!(r.text(), "a=1&b=two+words");
}

#[tokio::test]
async fn test_pool_reused_across_requests() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let a = http.connection_from_url(&server.url("/")).unwrap();
    for _ in 0..3 {
        let r = http
            .request(get(), &server.url("/"), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(r.status(), 200);
    }
    let b = http.connection_from_url(&server.url("/echo")).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let stats = http.stats().snapshot();
    assert_eq!(stats.pools_created, 1);
    assert_eq!(stats.requests, 3);
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_raised() {
    let port = {
        let listener = tokio::net::TcpListener::bind((HOST, 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let http = PoolManager::new();

    let err = http
        .request(
            get(),
            &format!("http://{}:{}/", HOST, port),
            RequestOptions::new().retries(Retry::from_count(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HostpoolError::MaxRetries {
            reason: MaxRetriesReason::Error(_),
            ..
        }
    ));
    assert_eq!(http.stats().snapshot().retries, 1);
}

#[tokio::test]
async fn test_scoped_cleanup() {
    let server = DummyServer::start().await;
    let http = PoolManager::new();

    let status = http
        .scoped(|m| async move {
            m.request(get(), &server.url("/"), RequestOptions::new())
                .await
                .map(|r| r.status())
        })
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert!(http.is_empty());

    // Cleanup also runs when the scoped work fails
    let result = http
        .scoped(|m| async move {
            m.connection_from_url(&format!("http://{}:1/", HOST))?;
            m.request(get(), "gopher://example.com/", RequestOptions::new())
                .await
        })
        .await;
    assert!(matches!(result, Err(HostpoolError::UnregisteredScheme(_))));
    assert!(http.is_empty());
}
