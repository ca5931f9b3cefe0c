mod cache;
mod config;
mod fetch;
mod health;
mod http;
mod metrics;
mod pathguard;
mod spider;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::fetch::RemoteFetcher;
use crate::metrics::MetricsRegistry;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "boxcache", about = "Caching proxy for TVBox rule-set configs")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/boxcache/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: RemoteFetcher,
    pub cache: CacheStore,
    pub metrics: MetricsRegistry,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let app = http::handler::create_router(Arc::new(state.clone()));

    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .listen
        .parse()
        .context("invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Cache epoch maintenance
// ---------------------------------------------------------------------------

/// Re-run epoch maintenance on a fixed interval so a long-lived process
/// still rolls (and purges) expired epochs. The same idempotent routine the
/// startup path runs; purges are counted, failures logged and retried on
/// the next tick.
async fn run_epoch_maintenance(state: AppState) {
    let interval = Duration::from_secs(state.config.cache.epoch_check_interval_secs);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match state.cache.maintain_epoch() {
            Ok(true) => {
                state.metrics.metrics.epoch_purges.inc();
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "cache epoch maintenance failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting boxcache");

    // ---- Ensure working directories exist ----
    tokio::fs::create_dir_all(&config.paths.box_root)
        .await
        .with_context(|| {
            format!(
                "failed to create box root: {}",
                config.paths.box_root.display()
            )
        })?;

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- Cache store ----
    let cache = CacheStore::new(&config.cache);
    if cache
        .maintain_epoch()
        .context("initial cache epoch maintenance failed")?
    {
        metrics.metrics.epoch_purges.inc();
    }

    // ---- Outbound fetcher ----
    let fetcher = RemoteFetcher::new(&config.fetch)?;
    if config.fetch.danger_accept_invalid_certs {
        tracing::warn!("outbound TLS certificate verification is disabled");
    }

    // ---- App state ----
    let state = AppState {
        config: Arc::clone(&config),
        fetcher,
        cache,
        metrics,
    };

    // ---- Spawn services ----
    let epoch_handle = tokio::spawn({
        let s = state.clone();
        async move { run_epoch_maintenance(s).await }
    });

    run_http_server(state).await?;

    // The maintenance loop has no shutdown of its own; the process is done
    // once the HTTP server has drained.
    epoch_handle.abort();

    tracing::info!("boxcache shut down cleanly");
    Ok(())
}
