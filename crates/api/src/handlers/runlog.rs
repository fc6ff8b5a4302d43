//! Run log views.
//!
//! Rendered views are reconciled against the registry on every request; the
//! log file is only ever appended to by the engine.

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse};
use serde::Deserialize;

use crate::error::AppResult;
use crate::state::AppState;

/// Default tail length of `/api/lru`.
pub const DEFAULT_LRU_LINES: usize = 6;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// GET /api/rjc
///
/// Number of running jobs, as plain text.
pub async fn running_count(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.registry_size().to_string()
}

#[derive(Debug, Deserialize)]
pub struct LruQuery {
    /// Tail length; 0 asks for the whole rendering window.
    pub tl: Option<usize>,
}

/// GET /api/lru?tl=N
///
/// The last `N` rendered run log lines, newline separated.
pub async fn latest_runs(
    State(state): State<AppState>,
    Query(query): Query<LruQuery>,
) -> AppResult<impl IntoResponse> {
    let lines = state
        .engine
        .rendered_tail(query.tl.unwrap_or(DEFAULT_LRU_LINES))
        .await?;
    Ok(Html(lines.join("\n")))
}

/// GET /runlog
///
/// The configured tail of the run log as an HTML fragment, one event per line.
pub async fn run_log(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let lines = state
        .engine
        .rendered_tail(state.config.run_log_tail_lines)
        .await?;
    let mut body = String::new();
    for line in &lines {
        body.push_str(line);
        body.push_str("<br/>\n");
    }
    Ok(Html(body))
}

/// GET /fullrunlog
///
/// The raw run log file, unreconciled.
pub async fn full_run_log(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let text = state.engine.run_log().read_all().await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], text))
}
