//! Debug HTTP server
//!
//! # Routes
//!
//! - `GET /health` - liveness and the supervisor's current state
//! - `GET /metrics` - Prometheus text format

use crate::metrics;
use crate::supervisor::PipelineState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build the router
pub fn router(state: watch::Receiver<PipelineState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

/// Serve until the process exits
pub async fn serve(addr: &str, state: watch::Receiver<PipelineState>) -> crate::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = addr, "Debug server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health(State(state): State<watch::Receiver<PipelineState>>) -> impl IntoResponse {
    let state = *state.borrow();
    Json(serde_json::json!({
        "status": "ok",
        "state": state,
        "streaming": state == PipelineState::Streaming,
    }))
}

async fn metrics_text() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
