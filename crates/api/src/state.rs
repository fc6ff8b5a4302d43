use std::sync::Arc;

use bacillus_core::engine::Engine;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (auth credentials, tail lengths, demo mode).
    pub config: Arc<ServerConfig>,
    /// The job engine: descriptor table, registry, run log.
    pub engine: Arc<Engine>,
    /// Cancelled to stop the HTTP server gracefully.
    pub shutdown: CancellationToken,
}
