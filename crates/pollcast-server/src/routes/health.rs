//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::metrics::MetricsSnapshot;
use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Tenants with a running worker.
    pub tenants: usize,
    /// Connected subscribers across all tenants.
    pub subscribers: usize,
    /// Watch counters.
    pub metrics: MetricsSnapshot,
}

/// Health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tenants: state.hub.tenant_count(),
        subscribers: state.hub.total_subscribers(),
        metrics: state.hub.metrics().snapshot(),
    })
}
