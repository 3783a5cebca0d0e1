// crates/server/src/main.rs
//! Mediadrop server binary.
//!
//! Reads configuration from the environment, checks that the `yt-dlp`
//! binary runs, and serves the API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mediadrop_core::YtDlpExtractor;
use mediadrop_server::jobs::spawn_record_sweeper;
use mediadrop_server::{create_app, init_metrics, AppState, Config};

/// Upper bound on how often finished job records are swept.
const SWEEP_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,mediadrop_server=info,mediadrop_core=info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("creating download directory {}", config.download_dir.display()))?;

    match YtDlpExtractor::new(config.ytdlp_bin.clone()).version().await {
        Some(version) => tracing::info!(binary = %config.ytdlp_bin, %version, "Extraction engine found"),
        None => tracing::warn!(
            binary = %config.ytdlp_bin,
            "Extraction engine not runnable; downloads will fail until it is installed"
        ),
    }

    init_metrics();

    let addr = config.addr();
    let flush_on_shutdown = config.flush_on_shutdown;
    let state = AppState::new(config);
    let app = create_app(Arc::clone(&state));

    let sweeper_shutdown = CancellationToken::new();
    let sweep_after = state.config.sweep_after();
    let sweeper = spawn_record_sweeper(
        Arc::clone(state.manager.store()),
        sweep_after,
        sweep_after.min(SWEEP_EVERY),
        sweeper_shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        %addr,
        download_dir = %state.config.download_dir.display(),
        retention_secs = state.config.retention.as_secs(),
        "mediadrop v{} listening",
        env!("CARGO_PKG_VERSION")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper_shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Record sweeper ended abnormally");
    }

    if flush_on_shutdown {
        let flushed = state.expiry.flush().await;
        tracing::info!(flushed, "Shutdown complete");
    } else {
        tracing::info!(pending = state.expiry.pending(), "Shutdown complete; artifacts left on disk");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
