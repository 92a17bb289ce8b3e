//! Hostpool - Per-Host HTTP Connection Pool Manager
//!
//! Command-line fetcher that sends every URL through one shared pool manager.

use anyhow::{Context, Result};
use clap::Parser;
use hostpool::config::load_config;
use hostpool::{Config, PoolManager, RequestOptions, Retry};
use hyper::Method;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Hostpool - fetch URLs through a per-host connection pool manager
#[derive(Parser, Debug)]
#[command(name = "hostpool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Do not follow redirects
    #[arg(long)]
    no_redirect: bool,

    /// Total retry budget (redirects included)
    #[arg(short, long)]
    retries: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,

    /// URLs to fetch
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };

    info!("Hostpool v{}", hostpool::VERSION);

    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", args.method))?;
    let manager = PoolManager::from_config(&config)?;

    let mut failed = 0usize;
    for url in &args.urls {
        let mut options = RequestOptions::new().redirect(!args.no_redirect);
        if let Some(retries) = args.retries {
            options = options.retries(Retry::from_count(retries));
        }

        let outcome = tokio::select! {
            result = manager.request(method.clone(), url, options) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        };

        match outcome {
            Ok(response) => println!(
                "{} {} ({}:{}) {} bytes",
                response.status(),
                response.url,
                response.pool.host,
                response.pool.port,
                response.data().len()
            ),
            Err(e) => {
                error!("{}: {}", url, e);
                failed += 1;
            }
        }
    }

    let stats = manager.stats().snapshot();
    info!(
        "Pools: created={}, reused={}, evicted={}; requests={}, redirects={}, retries={}",
        stats.pools_created,
        stats.pools_reused,
        stats.pools_evicted,
        stats.requests,
        stats.redirects,
        stats.retries
    );
    manager.clear();

    if failed > 0 {
        anyhow::bail!("{} of {} request(s) failed", failed, args.urls.len());
    }
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
