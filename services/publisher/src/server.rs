//! HTTP status API.
//!
//! Provides endpoints for:
//! - Liveness (`/health`)
//! - Scheduler state and last cycle outcomes (`/status`)
//! - Prometheus metrics (`/metrics`)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::scheduler::StatusHandle;

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    pub status: Arc<StatusHandle>,
    /// Absent when no recorder is installed, e.g. in tests.
    pub prometheus: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    stage: aqi_common::CycleStage,
    consecutive_failures: u64,
}

// ============================================================================
// Router
// ============================================================================

/// Create the status API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

/// Serve the status API on `port` until the process exits.
pub async fn run_server(state: Arc<ServerState>, port: u16) -> Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(address = %addr, "Status server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - liveness; the service is alive even while cycles fail.
async fn health_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.status.snapshot().await;
    Json(HealthResponse {
        status: "ok",
        service: "publisher",
        stage: status.stage,
        consecutive_failures: status.consecutive_failures,
    })
}

/// GET /status - scheduler snapshot
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.status.snapshot().await)
}

/// GET /metrics - Prometheus text format
async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
