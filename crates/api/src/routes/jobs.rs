//! Route definitions for launching, cancelling and inspecting jobs.

use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// ```text
/// GET,POST  /{tag}                 -> trigger_job
/// GET       /cancel?id=            -> cancel_job
/// GET       /api/jobs              -> list_running
/// GET       /api/jobs/{id}/stage   -> job_stage
/// GET       /api/params/{tag}      -> job_params_spec
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{tag}", get(jobs::trigger_job).post(jobs::trigger_job))
        .route("/cancel", get(jobs::cancel_job))
        .route("/api/jobs", get(jobs::list_running))
        .route("/api/jobs/{id}/stage", get(jobs::job_stage))
        .route("/api/params/{tag}", get(jobs::job_params_spec))
}
