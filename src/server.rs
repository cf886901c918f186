//! # HTTP Server
//!
//! Metrics and health probes.
//!
//! - `GET /metrics` Prometheus text format
//! - `GET /healthz` liveness, always `ok` while the process serves requests
//! - `GET /readyz` readiness, `ok` once the watch loop runs

use crate::observability::metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state of the probe endpoints
#[derive(Debug, Default)]
pub struct ServerState {
    /// Listener is bound
    pub is_serving: Arc<AtomicBool>,
    /// Watch loop is running
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn mark_serving(&self) {
        self.is_serving.store(true, Ordering::Relaxed);
    }

    pub fn is_serving(&self) -> bool {
        self.is_serving.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `address`, mark the server serving and serve until the task is dropped
pub async fn start_server(address: &str, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("HTTP server listening on {}", address);
    state.mark_serving();
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn serve_metrics() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
