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
    pub running_jobs: usize,
    /// Whether new launches are being refused.
    pub shutting_down: bool,
}

/// GET /health -- returns service status. Never requires authentication.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let shutting_down = state.engine.is_shutting_down();
    let status = if shutting_down { "draining" } else { "ok" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        running_jobs: state.engine.registry_size(),
        shutting_down,
    })
}

/// Mount health check routes (outside the authenticated route tree).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
