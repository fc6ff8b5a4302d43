//! Console artifact routes.
//!
//! Artifacts are served under the last component of the job home (the
//! `segment`), matching the links written into the run log and preambles.

use axum::routing::get;
use axum::Router;

use crate::handlers::console;
use crate::state::AppState;

/// ```text
/// GET  /{segment}/fullconsole/{dir}/console.out  -> full_console
/// GET  /{segment}/{dir}/console.out              -> console_view
/// GET  /api/console/{dir}                        -> console_summary
/// ```
pub fn router(segment: &str) -> Router<AppState> {
    Router::new()
        .route(
            &format!("/{segment}/fullconsole/{{dir}}/console.out"),
            get(console::full_console),
        )
        .route(
            &format!("/{segment}/{{dir}}/console.out"),
            get(console::console_view),
        )
        .route("/api/console/{dir}", get(console::console_summary))
}
