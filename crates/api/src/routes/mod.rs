pub mod admin;
pub mod console;
pub mod health;
pub mod jobs;
pub mod runlog;

use axum::Router;

use crate::state::AppState;

/// Build the authenticated route tree.
///
/// Route hierarchy:
///
/// ```text
/// /{tag}                                  launch (GET or POST)
/// /cancel?id=                             cancel a running instance
///
/// /runlog                                 rendered run log tail
/// /fullrunlog                             raw run log
///
/// /{segment}/{dir}/console.out            console view
/// /{segment}/fullconsole/{dir}/console.out   raw console artifact
///
/// /api/rjc                                running job count
/// /api/lru?tl=N                           last N rendered run log lines
/// /api/jobs                               running instances
/// /api/jobs/{id}/stage                    stage of a running instance
/// /api/params/{tag}                       declared job parameters
/// /api/console/{dir}                      decoded console artifact
///
/// /shutdown                               drain and stop
/// /cancelshutdown                         leave shutdown mode
/// /rudeshutdown                           stop now
/// ```
///
/// `segment` is the last path component of the job home.
pub fn app_routes(segment: &str) -> Router<AppState> {
    Router::new()
        .merge(jobs::router())
        .merge(runlog::router())
        .merge(console::router(segment))
        .merge(admin::router())
}
