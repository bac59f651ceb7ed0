/// Liveness and readiness endpoints
///
/// `/health` always answers; `/ready` reports whether the queue connection is up

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;

/// Readiness check, e.g. the NATS connection state
pub type ReadinessCheck = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
struct HealthState {
    ready: ReadinessCheck,
}

pub fn router(ready: ReadinessCheck) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(HealthState { ready })
}

/// Serve the health router on `0.0.0.0:port` until the task is dropped
pub async fn serve(port: u16, ready: ReadinessCheck) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Health endpoints listening on {}", addr);
    axum::serve(listener, router(ready)).await
}

/// Health check endpoint (liveness)
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "qrelay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint
async fn readiness_check(
    State(state): State<HealthState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if (state.ready)() {
        Ok(Json(serde_json::json!({
            "status": "ready",
            "service": "qrelay",
            "nats": "connected"
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
