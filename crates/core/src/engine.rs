//! The engine context object.
//!
//! [`Engine`] owns the job table, the registry of running instances, the run
//! log and the launch counter. It is built once at startup and shared behind
//! an `Arc`; tests build as many independent engines as they need.
//!
//! A launch goes through these steps, each with its own failure:
//!
//! | Step | Failure |
//! |------|---------|
//! | resolve tag | [`LaunchError::UnknownJob`] |
//! | refuse while draining | [`LaunchError::ShuttingDown`] |
//! | reserve a registry slot | [`LaunchError::CapacityExceeded`] |
//! | create workspace + console preamble | [`LaunchError::WorkspaceCreateFailed`] |
//! | build env, start process, register | [`LaunchError::LaunchFailed`] |
//!
//! Only the last two leave a trace in the run log. After a successful start
//! the process is awaited, the console header is finalised, a completion line
//! is appended and the instance is unregistered, whatever the exit status.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::hook::HookEvent;
use crate::jobs::console::{self, KILLED_STATUS};
use crate::jobs::environment::JobEnvironment;
use crate::jobs::executor::{spawn_job, wait_for_exit, JobOutput};
use crate::jobs::registry::{CancelOutcome, JobRegistry, Registration, Reservation, RunningJob};
use crate::jobs::stage;
use crate::jobs::workspace::{self, Workspace, WorkspaceLayout};
use crate::jobs::JobTable;
use crate::params::{self, ParamSpec};
use crate::runlog::line::{self, Completion, Decoration, JobLine};
use crate::runlog::{render, IndicatorStyle, LiveJobs, RunLog};
use crate::types::InstanceId;

/// Default concurrent-job limit.
pub const DEFAULT_JOB_LIMIT: usize = 8;

/// Why a launch request was refused.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Running job limit ({limit}) reached")]
    CapacityExceeded { limit: usize },

    #[error("Failed to create workspace for job {tag}: {source}")]
    WorkspaceCreateFailed {
        tag: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start job {tag}: {source}")]
    LaunchFailed {
        tag: String,
        #[source]
        source: io::Error,
    },

    #[error("Server is in shutdown mode")]
    ShuttingDown,
}

/// Engine settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub layout: WorkspaceLayout,
    pub job_limit: usize,
    /// Send job output to the server's stdout instead of the console artifact.
    pub attach_stdout: bool,
    /// Embed the stage summary in completion lines.
    pub show_stages_on_finished: bool,
    /// Splice live stage text into running lines when rendering.
    pub live_stages: bool,
    pub indicator_style: IndicatorStyle,
}

impl EngineConfig {
    pub fn new(job_home: impl Into<PathBuf>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: WorkspaceLayout::new(job_home, artifacts_dir),
            job_limit: DEFAULT_JOB_LIMIT,
            attach_stdout: false,
            show_stages_on_finished: false,
            live_stages: true,
            indicator_style: IndicatorStyle::default(),
        }
    }
}

/// A request to start one instance of a job.
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub tag: String,
    /// Caller-supplied variables (job parameters), applied last.
    pub extra_env: Vec<(String, String)>,
    pub hook: HookEvent,
}

impl LaunchRequest {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_env(mut self, extra_env: Vec<(String, String)>) -> Self {
        self.extra_env = extra_env;
        self
    }

    pub fn with_hook(mut self, hook: HookEvent) -> Self {
        self.hook = hook;
        self
    }
}

/// How a finished instance ended.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub instance_id: InstanceId,
    pub tag: String,
    /// Status written to the console header.
    pub status: u8,
    pub cancelled: bool,
    pub workdir: PathBuf,
}

/// A started, registered instance awaiting completion.
struct StartedJob {
    child: Child,
    cancel: CancellationToken,
    registration: Registration,
    workspace: Workspace,
    tag: String,
    decoration: Decoration,
}

impl StartedJob {
    fn line(&self) -> JobLine<'_> {
        JobLine {
            instance_id: &self.workspace.instance_id,
            tag: &self.tag,
            decoration: &self.decoration,
            console_url: &self.workspace.console_url,
            artifacts_url: &self.workspace.artifacts_url,
        }
    }
}

/// Shared engine state.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    jobs: JobTable,
    registry: Arc<JobRegistry>,
    run_log: RunLog,
    launch_counter: AtomicU32,
    shutdown_mode: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, jobs: JobTable, run_log: RunLog) -> Self {
        let registry = Arc::new(JobRegistry::new(config.job_limit));
        Self {
            config,
            jobs,
            registry,
            run_log,
            launch_counter: AtomicU32::new(0),
            shutdown_mode: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    // ------------------------------------------------------------------
    // Launching
    // ------------------------------------------------------------------

    /// Start an instance and return its id once the process is running.
    ///
    /// The whole start and completion sequence runs on a spawned task, so
    /// dropping the returned future never abandons a registered instance.
    pub async fn launch(self: &Arc<Self>, request: LaunchRequest) -> Result<InstanceId, LaunchError> {
        let tag = request.tag.clone();
        let (started_tx, started_rx) = oneshot::channel();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.start(request).await {
                Ok(started) => {
                    let _ = started_tx.send(Ok(started.workspace.instance_id.clone()));
                    engine.finish(started).await;
                }
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                }
            }
        });
        started_rx.await.unwrap_or_else(|_| Err(launch_task_lost(tag)))
    }

    /// Start an instance and wait for it to finish.
    pub async fn execute(self: &Arc<Self>, request: LaunchRequest) -> Result<JobOutcome, LaunchError> {
        let tag = request.tag.clone();
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let started = engine.start(request).await?;
            Ok::<_, LaunchError>(engine.finish(started).await)
        });
        task.await.unwrap_or_else(|_| Err(launch_task_lost(tag)))
    }

    async fn start(&self, request: LaunchRequest) -> Result<StartedJob, LaunchError> {
        let descriptor = self
            .jobs
            .get(&request.tag)
            .ok_or_else(|| LaunchError::UnknownJob(request.tag.clone()))?;
        if self.is_shutting_down() {
            return Err(LaunchError::ShuttingDown);
        }
        let mut reservation = self.registry.reserve().ok_or(LaunchError::CapacityExceeded {
            limit: self.registry.limit(),
        })?;
        let tag = descriptor.tag.clone();

        let (workspace, output) = match self
            .prepare_workspace(&mut reservation, &descriptor.options, &tag)
            .await
        {
            Ok(prepared) => prepared,
            Err((ws, e)) => {
                tracing::error!(tag = %tag, error = %e, "Failed to create job workspace");
                self.log_line(&line::workspace_error_line(&tag, &e)).await;
                if let Some(ws) = ws {
                    let _ = tokio::fs::remove_dir_all(&ws.path).await;
                }
                return Err(LaunchError::WorkspaceCreateFailed { tag, source: e });
            }
        };

        let launch_index = self.launch_counter.fetch_add(1, Ordering::Relaxed);
        let decoration = Decoration::new(
            self.config.indicator_style,
            launch_index,
            &workspace.instance_id,
        );

        let mut extra_env = descriptor.env.clone();
        extra_env.extend(request.extra_env);
        let env = JobEnvironment::for_instance(&workspace, &tag, &request.hook, &extra_env);

        let child = match spawn_job(descriptor, &workspace, &env, output) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    tag = %tag,
                    instance_id = %workspace.instance_id,
                    command = %descriptor.command,
                    error = %e,
                    "Failed to start job process",
                );
                self.log_line(&line::launch_error_line(&decoration, &tag)).await;
                return Err(LaunchError::LaunchFailed { tag, source: e });
            }
        };

        let cancel = CancellationToken::new();
        let registration = reservation.register(RunningJob {
            instance_id: workspace.instance_id.clone(),
            tag: tag.clone(),
            workdir: workspace.path.clone(),
            started_at: chrono::Utc::now(),
            cancel: cancel.clone(),
        });

        let started = StartedJob {
            child,
            cancel,
            registration,
            workspace,
            tag,
            decoration,
        };
        self.log_line(&line::launch_line(&started.line())).await;
        tracing::info!(
            instance_id = %started.workspace.instance_id,
            tag = %started.tag,
            workdir = %started.workspace.path.display(),
            "Job launched",
        );
        Ok(started)
    }

    /// Allocate the workspace and write the console preamble.
    ///
    /// On failure, returns the workspace if one was already created so the
    /// caller can clean it up.
    async fn prepare_workspace(
        &self,
        reservation: &mut Reservation,
        options: &str,
        tag: &str,
    ) -> Result<(Workspace, JobOutput), (Option<Workspace>, io::Error)> {
        let ws = workspace::allocate_with(&self.config.layout, options, tag, |id| {
            reservation.claim_id(id)
        })
        .await
            .map_err(|e| (None, e))?;
        let console = match console::create_console(&ws.console_path, &ws.full_console_url, tag).await {
            Ok(file) => file,
            Err(e) => return Err((Some(ws), e)),
        };
        let output = if self.config.attach_stdout {
            JobOutput::Inherit
        } else {
            JobOutput::Console(console)
        };
        Ok((ws, output))
    }

    async fn finish(&self, mut job: StartedJob) -> JobOutcome {
        let (status, cancelled) = match wait_for_exit(&mut job.child, &job.cancel).await {
            Ok(termination) => (termination.status(), termination.is_cancelled()),
            Err(e) => {
                tracing::error!(
                    instance_id = %job.workspace.instance_id,
                    error = %e,
                    "Failed waiting for job process",
                );
                (KILLED_STATUS, false)
            }
        };

        if let Err(e) = console::mark_finished(&job.workspace.console_path, status).await {
            tracing::warn!(
                instance_id = %job.workspace.instance_id,
                error = %e,
                "Failed to finalise console header",
            );
        }

        let stage = if self.config.show_stages_on_finished {
            let summary = stage::stage_summary(&job.workspace.path).await;
            line::finished_stage_markup(summary.as_deref())
        } else {
            String::new()
        };
        let completion = Completion::from_status(status, cancelled);
        self.log_line(&line::completion_line(&job.line(), completion, &stage))
            .await;

        tracing::info!(
            instance_id = %job.workspace.instance_id,
            tag = %job.tag,
            status,
            cancelled,
            "Job finished",
        );

        let outcome = JobOutcome {
            instance_id: job.workspace.instance_id.clone(),
            tag: job.tag.clone(),
            status,
            cancelled,
            workdir: job.workspace.path.clone(),
        };
        drop(job.registration);
        outcome
    }

    async fn log_line(&self, body: &str) {
        if let Err(e) = self.run_log.append(body).await {
            tracing::error!(error = %e, path = %self.run_log.path().display(), "Failed to append to run log");
        }
    }

    // ------------------------------------------------------------------
    // Cancellation and status
    // ------------------------------------------------------------------

    /// Ask a running instance to terminate. Does not wait for it.
    pub fn cancel(&self, instance_id: &str) -> CancelOutcome {
        let outcome = self.registry.cancel(instance_id);
        match outcome {
            CancelOutcome::Cancelled => tracing::info!(instance_id, "Job cancelled"),
            CancelOutcome::NotFound => {
                tracing::debug!(instance_id, "Cancel requested for unknown or finished job")
            }
        }
        outcome
    }

    pub fn registry_size(&self) -> usize {
        self.registry.len()
    }

    pub fn running_jobs(&self) -> Vec<RunningJob> {
        self.registry.snapshot()
    }

    /// Raw stage text of a running instance.
    pub async fn stage_of(&self, instance_id: &str) -> Option<String> {
        let job = self.registry.lookup(instance_id)?;
        stage::read_stage(&job.workdir).await
    }

    /// The last `tail_lines` run log event lines (all when 0), reconciled
    /// against the registry. The log file itself is never modified.
    pub async fn rendered_tail(&self, tail_lines: usize) -> io::Result<Vec<String>> {
        let lines = self.run_log.event_lines().await?;
        let live = self.live_jobs().await;
        Ok(render(&lines, tail_lines, &live, self.config.indicator_style))
    }

    async fn live_jobs(&self) -> LiveJobs {
        let mut live = LiveJobs::new();
        for job in self.registry.snapshot() {
            let stage = if self.config.live_stages {
                stage::stage_summary(&job.workdir).await
            } else {
                None
            };
            live.insert(job.instance_id, stage);
        }
        live
    }

    /// Parameters declared by a job's script.
    pub async fn params_of(&self, tag: &str) -> Result<Vec<ParamSpec>, CoreError> {
        let descriptor = self
            .jobs
            .get(tag)
            .ok_or_else(|| CoreError::UnknownJob(tag.to_string()))?;
        params::read_param_specs(&descriptor.script_path(&self.config.layout.job_home)).await
    }

    // ------------------------------------------------------------------
    // Shutdown mode
    // ------------------------------------------------------------------

    pub fn set_shutdown_mode(&self, active: bool) {
        self.shutdown_mode.store(active, Ordering::SeqCst);
        tracing::info!(active, running = self.registry_size(), "Shutdown mode changed");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_mode.load(Ordering::SeqCst)
    }
}

fn launch_task_lost(tag: String) -> LaunchError {
    LaunchError::LaunchFailed {
        tag,
        source: io::Error::other("launch task ended before reporting"),
    }
}
