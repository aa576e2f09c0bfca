// src/main.rs
//! Ingestion coordinator binary.
//! Loads config, registers sources, runs the per-source loops and serves the
//! ops endpoints until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ingest_coordinator::config::load_config_default;
use ingest_coordinator::metrics::Metrics;
use ingest_coordinator::{create_router, AppState, Coordinator, DataValidator, LoggingProcessor, Registry};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ingest_coordinator=info,ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default().context("loading ingest config")?;
    // Recorder goes in before any loop emits metrics.
    let metrics = if cfg.server.enabled {
        Some(Metrics::init()?)
    } else {
        None
    };

    // Configuration errors are fatal at startup.
    let registry = Arc::new(Registry::with_builtin_types());
    for source in &cfg.sources {
        registry
            .register_source(source.clone())
            .with_context(|| format!("registering source `{}`", source.source_id))?;
    }
    info!(sources = cfg.sources.len(), "sources registered");

    let validator = Arc::new(DataValidator::new(cfg.validator.clone()));
    let coordinator = Arc::new(
        Coordinator::builder(registry)
            .validator(validator)
            .processor(LoggingProcessor)
            .settings(cfg.coordinator.clone())
            .build(),
    );
    coordinator.apply_priority_tiers(&cfg.scheduling);
    coordinator.start();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = if let Some(metrics) = &metrics {
        let router = create_router(
            AppState {
                coordinator: coordinator.clone(),
            },
            Some(metrics),
        );
        let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
            .await
            .with_context(|| format!("binding {}", cfg.server.bind))?;
        info!(bind = %cfg.server.bind, "ops server listening");
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutdown requested");
    coordinator.stop().await;
    let _ = stop_tx.send(());

    if let Some(handle) = server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = ?e, "ops server error"),
            Err(e) => warn!(error = ?e, "ops server task failed"),
        }
    }
    Ok(())
}
