use axum::routing::get;
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// ```text
/// GET  /shutdown        -> shutdown (drain, then stop)
/// GET  /cancelshutdown  -> cancel_shutdown
/// GET  /rudeshutdown    -> rude_shutdown (stop now)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shutdown", get(admin::shutdown))
        .route("/cancelshutdown", get(admin::cancel_shutdown))
        .route("/rudeshutdown", get(admin::rude_shutdown))
}
