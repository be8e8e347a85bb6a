use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Number of cases the registry indexed at startup.
    pub cases_indexed: usize,
    /// Whether the artifact root is reachable.
    pub artifacts_healthy: bool,
}

/// GET /health -- returns service health and engine reachability.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let artifacts_healthy = state.artifacts.root().is_dir();

    let status = if artifacts_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        cases_indexed: state.registry.len(),
        artifacts_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
