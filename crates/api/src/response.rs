//! Shared response envelope types for API handlers.
//!
//! JSON responses use a `{ "data": ... }` envelope. Plain-text and HTML
//! endpoints (run log views, console artifacts) return their bodies as-is.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: jobs }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
