// src/api.rs
//! Ops HTTP surface: health, stats and source control.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::connector::OverallStatus;
use crate::coordinator::Coordinator;
use crate::error::IngestError;
use crate::metrics::Metrics;
use crate::registry::RegistryExport;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Ops routes, plus `/metrics` when a recorder is given.
pub fn create_router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/sources", get(sources))
        .route("/sources/{id}/enable", post(enable_source))
        .route("/sources/{id}/disable", post(disable_source))
        .route("/sources/{id}/fetch", post(fetch_source))
        .with_state(state);
    match metrics {
        Some(m) => router.merge(m.router()),
        None => router,
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.coordinator.health().await;
    let code = match health.status {
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(health))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.stats())
}

async fn sources(State(state): State<AppState>) -> Json<RegistryExport> {
    Json(state.coordinator.registry().export_configuration())
}

#[derive(Serialize)]
struct SourceAck {
    source_id: String,
    enabled: bool,
}

async fn enable_source(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    set_enabled(&state, id, true)
}

async fn disable_source(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    set_enabled(&state, id, false)
}

fn set_enabled(state: &AppState, id: String, enabled: bool) -> axum::response::Response {
    let registry = state.coordinator.registry();
    let result = if enabled {
        registry.enable_source(&id)
    } else {
        registry.disable_source(&id)
    };
    match result {
        Ok(()) => Json(SourceAck {
            source_id: id,
            enabled,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
struct FetchResult {
    source_id: String,
    events: usize,
}

async fn fetch_source(State(state): State<AppState>, Path(id): Path<String>) -> axum::response::Response {
    if !state.coordinator.registry().is_registered(&id) {
        return error_response(IngestError::SourceNotFound(id));
    }
    let events = state.coordinator.fetch_from_source(&id).await;
    Json(FetchResult {
        source_id: id,
        events: events.len(),
    })
    .into_response()
}

fn error_response(e: IngestError) -> axum::response::Response {
    let code = match &e {
        IngestError::SourceNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_configuration() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}
