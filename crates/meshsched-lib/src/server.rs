//! HTTP surface for probes and Prometheus scrapes
//!
//! Shared by the controller and scheduler binaries.

use crate::health::HealthRegistry;
use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    /// Reported on `/`
    pub component: &'static str,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, component: &'static str) -> Self {
        Self {
            health_registry,
            component,
        }
    }
}

fn probe_status(passing: bool) -> StatusCode {
    if passing {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Degraded still answers 200: the process is doing useful work
async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health_registry.health().await;
    (probe_status(report.status.is_operational()), Json(report)).into_response()
}

async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health_registry.readiness().await;
    (probe_status(report.ready), Json(report)).into_response()
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();

    match encoder.encode(&prometheus::gather(), &mut body) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "component": state.component,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve on all interfaces until `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, component = state.component, "Serving health and metrics");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("API server error")
}
