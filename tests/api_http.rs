// tests/api_http.rs
//
// HTTP-level tests for the ops Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::Value as Json;
use std::sync::Arc;
use tower::ServiceExt as _; // for `oneshot`

use common::{mock, mock_registry};
use ingest_coordinator::{create_router, AppState, Coordinator, DataValidator};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app() -> (Router, Arc<Coordinator>) {
    let registry = mock_registry();
    registry
        .register_source(mock("alpha", "events").with_param("events", 2))
        .expect("register alpha");
    registry
        .register_source(mock("bravo", "fail"))
        .expect("register bravo");
    let coordinator = Arc::new(Coordinator::new(
        Arc::new(registry),
        Arc::new(DataValidator::default()),
    ));
    let app = create_router(
        AppState {
            coordinator: coordinator.clone(),
        },
        None,
    );
    (app, coordinator)
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).expect("json body");
    (status, json)
}

#[tokio::test]
async fn health_lists_every_source() {
    let (app, _) = test_app();
    let (status, body) = call(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["running"], false);
    assert_eq!(body["sources"]["alpha"]["status"], "healthy");
    assert_eq!(body["sources"]["bravo"]["source_type"], "mock");
}

#[tokio::test]
async fn fetch_route_runs_one_cycle() {
    let (app, coordinator) = test_app();
    let (status, body) = call(app.clone(), "POST", "/sources/alpha/fetch").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source_id"], "alpha");
    assert_eq!(body["events"], 2);

    // a failing source still answers 200 with zero events
    let (status, body) = call(app.clone(), "POST", "/sources/bravo/fetch").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"], 0);
    assert_eq!(coordinator.stats().errors, 1);

    let (status, body) = call(app, "GET", "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_events"], 2);
    assert_eq!(body["errors"], 1);
    assert_eq!(body["per_source_stats"]["alpha"]["events"], 2);
}

#[tokio::test]
async fn unknown_source_is_404() {
    let (app, _) = test_app();
    let (status, body) = call(app.clone(), "POST", "/sources/nope/fetch").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = call(app, "POST", "/sources/nope/disable").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disable_and_list_sources() {
    let (app, coordinator) = test_app();
    let (status, body) = call(app.clone(), "POST", "/sources/alpha/disable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    assert!(coordinator.fetch_from_source("alpha").await.is_empty());

    let (status, body) = call(app.clone(), "GET", "/sources").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"]["alpha"]["enabled"], false);
    assert_eq!(body["sources"]["bravo"]["behavior"], "fail");

    let (status, body) = call(app, "POST", "/sources/alpha/enable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(coordinator.fetch_from_source("alpha").await.len(), 2);
}
