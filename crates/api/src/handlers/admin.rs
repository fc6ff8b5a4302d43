//! Shutdown control.
//!
//! `/shutdown` drains: new launches are refused and the server stops once
//! the last running instance has finished, unless `/cancelshutdown` comes
//! first. `/rudeshutdown` stops the server straight away; instances still
//! running are cancelled once the server has stopped.

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// How often a draining server checks for remaining instances.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
pub struct ShutdownStatus {
    pub shutting_down: bool,
    pub running_jobs: usize,
}

fn status(state: &AppState) -> ShutdownStatus {
    ShutdownStatus {
        shutting_down: state.engine.is_shutting_down(),
        running_jobs: state.engine.registry_size(),
    }
}

fn refuse_in_demo(state: &AppState) -> AppResult<()> {
    if state.config.demo_mode {
        return Err(AppError::Forbidden("Shutdown is disabled in demo mode".into()));
    }
    Ok(())
}

/// GET /shutdown
pub async fn shutdown(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    refuse_in_demo(&state)?;

    if !state.engine.is_shutting_down() {
        state.engine.set_shutdown_mode(true);
        tokio::spawn(drain(state.clone()));
    }

    Ok(Json(DataResponse { data: status(&state) }))
}

/// Wait for the registry to empty, then stop the server. Gives up quietly
/// if shutdown mode is left in the meantime.
async fn drain(state: AppState) {
    loop {
        if !state.engine.is_shutting_down() {
            tracing::info!("Shutdown cancelled");
            return;
        }
        if state.engine.registry_size() == 0 {
            tracing::info!("No jobs running, stopping server");
            state.shutdown.cancel();
            return;
        }
        tokio::select! {
            () = state.shutdown.cancelled() => return,
            () = tokio::time::sleep(DRAIN_POLL_INTERVAL) => {}
        }
    }
}

/// GET /cancelshutdown
pub async fn cancel_shutdown(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.set_shutdown_mode(false);
    Json(DataResponse { data: status(&state) })
}

/// GET /rudeshutdown
pub async fn rude_shutdown(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    refuse_in_demo(&state)?;

    tracing::warn!(
        running = state.engine.registry_size(),
        "Immediate shutdown requested"
    );
    state.shutdown.cancel();
    Ok(Json(DataResponse { data: status(&state) }))
}
