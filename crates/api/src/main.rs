use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bacillus_api::config::ServerConfig;
use bacillus_api::router::build_app_router;
use bacillus_api::state::AppState;
use bacillus_core::engine::Engine;
use bacillus_core::jobs::JobTable;
use bacillus_core::runlog::RunLog;

/// How long running instances get to record their completion after the
/// server has stopped.
const JOB_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "bacillus_api=debug,bacillus_core=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let jobs = JobTable::from_specs(std::env::args().skip(1))?;
    if jobs.is_empty() {
        tracing::warn!("No job endpoints given; every trigger will be rejected");
    }
    for job in jobs.iter() {
        tracing::info!(tag = %job.tag, command = %job.command, "Registered job endpoint");
    }

    // --- Run log ---
    let run_log = RunLog::open(config.run_log_path(), config.fresh_run_log).await?;
    run_log
        .write_banner(env!("CARGO_PKG_VERSION"), &config.listen_addr())
        .await?;
    tracing::info!(path = %run_log.path().display(), "Run log opened");

    // --- Engine ---
    let engine = Arc::new(Engine::new(config.engine_config(), jobs, run_log));

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        engine: Arc::clone(&engine),
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    stop_running_jobs(&engine).await;
    tracing::info!("Graceful shutdown complete");

    Ok(())
}

/// Cancel whatever is still running and give the instances a moment to
/// write their completion lines.
async fn stop_running_jobs(engine: &Engine) {
    let running = engine.running_jobs();
    if running.is_empty() {
        return;
    }
    tracing::info!(count = running.len(), "Cancelling running jobs");
    for job in &running {
        engine.cancel(&job.instance_id);
    }

    let drained = tokio::time::timeout(JOB_STOP_TIMEOUT, async {
        while engine.registry_size() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = engine.registry_size(),
            "Jobs still running at exit"
        );
    }
}

/// Wait for a termination signal or a shutdown request to initiate graceful
/// shutdown.
///
/// Handles SIGINT (Ctrl-C), SIGTERM (on Unix) and the `/shutdown` and
/// `/rudeshutdown` endpoints, which cancel `requested`.
async fn shutdown_signal(requested: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = requested.cancelled() => {
            tracing::info!("Shutdown requested over HTTP");
        }
    }
}
