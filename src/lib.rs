//! machinewatch -- machine telemetry ingestion and threshold anomaly detection.
//!
//! Readings are validated and stored in bounded per-machine series, scored by
//! a pool of evaluation workers, and turned into predictions and alerts that
//! the query layer and HTTP API expose.

pub mod api;
pub mod config;
pub mod detect;
pub mod pipeline;
pub mod query;
pub mod simulator;
pub mod storage;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::pipeline::Pipeline;

/// Start the machinewatch daemon: ingestion pipeline and API server.
pub async fn serve(config: Config) -> Result<()> {
    // 1. Start the pipeline (store, detection engine, worker pool)
    let pipeline = Arc::new(Pipeline::start(&config));

    // 2. Start API Server
    let addr: std::net::SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.api.bind))?;
    let app = api::router(api::state::AppState::new(pipeline.clone()));

    tracing::info!(%addr, "machinewatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 3. Drain queued evaluations before exit
    pipeline.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
