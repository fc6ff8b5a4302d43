/// Errors raised while loading or validating engine inputs (job descriptors,
/// configuration values, parameter specifiers).
///
/// Launch-time failures have their own taxonomy in
/// [`LaunchError`](crate::engine::LaunchError).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
