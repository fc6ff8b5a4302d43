use axum::routing::get;
use axum::Router;

use crate::handlers::runlog;
use crate::state::AppState;

/// ```text
/// GET  /api/rjc       -> running_count
/// GET  /api/lru?tl=N  -> latest_runs
/// GET  /runlog        -> run_log
/// GET  /fullrunlog    -> full_run_log
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rjc", get(runlog::running_count))
        .route("/api/lru", get(runlog::latest_runs))
        .route("/runlog", get(runlog::run_log))
        .route("/fullrunlog", get(runlog::full_run_log))
}
