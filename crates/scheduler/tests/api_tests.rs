//! Integration tests for the scheduler API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use meshsched_lib::{
    health::{components, HealthRegistry},
    observability::SchedulerMetrics,
    server::{create_router, AppState},
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::TOPOLOGY_READER).await;
    health_registry.register(components::BINDER).await;

    let state = Arc::new(AppState::new(health_registry, "network-aware-scheduler"));
    (create_router(state.clone()), state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_label_fallback_keeps_scheduler_operational() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_degraded(components::TOPOLOGY_READER, "topology stale, scoring from labels")
        .await;

    let (status, body) = get(app.clone(), "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");

    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_binding_failure_marks_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::BINDER, "binding rejected")
        .await;

    let (status, body) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["components"]["binder"]["message"], "binding rejected");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_scheduler_metrics() {
    let (app, _state) = setup_test_app().await;

    let metrics = SchedulerMetrics::new();
    metrics.inc_attempt("scheduled");
    metrics.inc_filter_rejection("NetworkAware");
    metrics.inc_label_fallback();
    metrics.inc_binding_errors();

    let (status, body) = get(app, "/metrics").await;
    let text = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("network_scheduler_attempts_total{result=\"scheduled\"}"));
    assert!(text.contains("network_scheduler_filter_rejections_total{plugin=\"NetworkAware\"}"));
    assert!(text.contains("network_scheduler_label_fallbacks_total"));
    assert!(text.contains("network_scheduler_binding_errors_total"));
}

#[tokio::test]
async fn test_index_reports_component() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/").await;
    let index: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(index["component"], "network-aware-scheduler");
}
