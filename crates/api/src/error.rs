use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bacillus_core::engine::LaunchError;
use bacillus_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the engine's error types and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A refused launch.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A validation or lookup error from `bacillus_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Local I/O failure (reading the run log or a console artifact).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong Basic auth credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// The operation is disabled on this server.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- Launch refusals ---
            AppError::Launch(launch) => match launch {
                LaunchError::UnknownJob(_) => {
                    (StatusCode::NOT_FOUND, "UNKNOWN_JOB", launch.to_string())
                }
                LaunchError::CapacityExceeded { .. } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "CAPACITY_EXCEEDED",
                    launch.to_string(),
                ),
                LaunchError::ShuttingDown => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SHUTTING_DOWN",
                    launch.to_string(),
                ),
                // Details stay in the server log and the run log.
                LaunchError::WorkspaceCreateFailed { tag, .. } => {
                    tracing::error!(error = %launch, "Workspace creation failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "WORKSPACE_CREATE_FAILED",
                        format!("Could not create a workspace for job {tag}"),
                    )
                }
                LaunchError::LaunchFailed { tag, .. } => {
                    tracing::error!(error = %launch, "Job launch failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "LAUNCH_FAILED",
                        format!("Could not start job {tag}"),
                    )
                }
            },

            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::UnknownJob(tag) => (
                    StatusCode::NOT_FOUND,
                    "UNKNOWN_JOB",
                    format!("Unknown job: {tag}"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Io(err) => {
                    tracing::error!(error = %err, "Core I/O error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Resource not found".to_string(),
            ),
            AppError::Io(err) => {
                tracing::error!(error = %err, "I/O error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, AppError::Unauthorized) {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"Bacillus\""),
            );
        }
        response
    }
}
