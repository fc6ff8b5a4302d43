//! Console artifact views.
//!
//! Directory names arrive from request paths and are validated with
//! [`workspace::resolve`] before any filesystem access.

use std::fmt::Write as _;
use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use bacillus_core::jobs::console::{ConsoleSummary, JobState, CONSOLE_FILE_NAME, CONSOLE_TAIL_LINES};
use bacillus_core::jobs::workspace;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

fn console_path(state: &AppState, dir: &str) -> AppResult<PathBuf> {
    workspace::resolve(&state.engine.config().layout, dir)
        .map(|p| p.join(CONSOLE_FILE_NAME))
        .ok_or_else(|| AppError::NotFound(format!("No workspace named {dir}")))
}

/// GET /{job_home}/fullconsole/{dir}/console.out
///
/// The raw console artifact, preamble included.
pub async fn full_console(
    State(state): State<AppState>,
    Path(dir): Path<String>,
) -> AppResult<impl IntoResponse> {
    let bytes = tokio::fs::read(console_path(&state, &dir)?).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], bytes))
}

/// GET /{job_home}/{dir}/console.out
///
/// Plain-text view of an instance: status, tag and the console tail.
pub async fn console_view(
    State(state): State<AppState>,
    Path(dir): Path<String>,
) -> AppResult<impl IntoResponse> {
    let summary = ConsoleSummary::read(&console_path(&state, &dir)?, CONSOLE_TAIL_LINES).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], render_view(&summary)))
}

fn render_view(summary: &ConsoleSummary) -> String {
    let status = match summary.header {
        Some(h) if h.state == JobState::Running => "running".to_string(),
        Some(h) if h.status == 0 => "finished successfully".to_string(),
        Some(h) => format!("finished with status {}", h.status),
        None => "unknown".to_string(),
    };

    let mut out = String::new();
    let _ = writeln!(out, "[{}] {status}", summary.tag);
    if summary.truncated {
        let _ = writeln!(out, "... (full console: {})", summary.link);
    }
    for line in &summary.tail {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// GET /api/console/{dir}
///
/// Decoded console header, tag and tail as JSON.
pub async fn console_summary(
    State(state): State<AppState>,
    Path(dir): Path<String>,
) -> AppResult<impl IntoResponse> {
    let summary = ConsoleSummary::read(&console_path(&state, &dir)?, CONSOLE_TAIL_LINES).await?;
    Ok(Json(DataResponse { data: summary }))
}
