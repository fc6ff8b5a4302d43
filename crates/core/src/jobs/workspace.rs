//! Per-instance workspace allocation.
//!
//! Every launch gets a fresh directory `bacillus_<opts>_<tag>_<id>` under the
//! job home, where `<id>` is a random decimal suffix that becomes the
//! instance id. Creation is exclusive (`mkdir` fails on an existing name), so
//! concurrent launches of the same tag can never share a workspace.

use std::io;
use std::path::PathBuf;

use crate::jobs::console::CONSOLE_FILE_NAME;
use crate::types::InstanceId;

/// Prefix of every workspace and artifact directory name.
pub const WORKSPACE_PREFIX: &str = "bacillus";

/// How many random suffixes to try before giving up.
const MAX_CREATE_ATTEMPTS: u32 = 16;

/// Where workspaces and artifacts live, and how they are addressed by URL.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Directory under which workspaces are created.
    pub job_home: PathBuf,
    /// Root of the per-instance artifact directories populated by jobs.
    pub artifacts_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(job_home: impl Into<PathBuf>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_home: job_home.into(),
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// URL path segment under which console artifacts are served: the last
    /// component of the job home (`workdir` for `./workdir`).
    pub fn url_segment(&self) -> String {
        self.job_home
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workdir".to_string())
    }
}

/// A freshly allocated workspace for one job instance.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub instance_id: InstanceId,
    /// `bacillus_<opts>_<tag>_<id>`.
    pub dir_name: String,
    /// Absolute workspace path; the job's working directory.
    pub path: PathBuf,
    /// Absolute path of the console artifact.
    pub console_path: PathBuf,
    /// Relative URL of the live console view.
    pub console_url: String,
    /// Absolute URL path of the raw console artifact (preamble line 2).
    pub full_console_url: String,
    /// Absolute path of the instance's artifact directory (not created).
    pub artifacts_path: PathBuf,
    /// URL path of the artifact directory.
    pub artifacts_url: String,
}

/// Workspace directory name for an instance.
pub fn dir_name(options: &str, tag: &str, instance_id: &str) -> String {
    format!("{WORKSPACE_PREFIX}_{options}_{tag}_{instance_id}")
}

/// Whether `name` is a plausible workspace directory name (used to validate
/// names arriving in request paths before touching the filesystem).
pub fn is_workspace_dir_name(name: &str) -> bool {
    name.starts_with(WORKSPACE_PREFIX)
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

/// Allocate a new workspace for `tag` under the layout's job home.
pub async fn allocate(layout: &WorkspaceLayout, options: &str, tag: &str) -> io::Result<Workspace> {
    allocate_with(layout, options, tag, |_| true).await
}

/// Like [`allocate`], but only uses instance ids accepted by `claim`.
///
/// Directory names include the tag, so the filesystem alone cannot keep
/// instance ids unique across jobs.
pub async fn allocate_with(
    layout: &WorkspaceLayout,
    options: &str,
    tag: &str,
    mut claim: impl FnMut(&str) -> bool,
) -> io::Result<Workspace> {
    tokio::fs::create_dir_all(&layout.job_home).await?;
    let home = tokio::fs::canonicalize(&layout.job_home).await?;
    let artifacts_root = std::path::absolute(&layout.artifacts_dir)?;
    let segment = layout.url_segment();

    for _ in 0..MAX_CREATE_ATTEMPTS {
        let instance_id = rand::random::<u32>().to_string();
        if !claim(&instance_id) {
            continue;
        }
        let name = dir_name(options, tag, &instance_id);
        let path = home.join(&name);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                return Ok(Workspace {
                    console_path: path.join(CONSOLE_FILE_NAME),
                    console_url: format!("{segment}/{name}/{CONSOLE_FILE_NAME}"),
                    full_console_url: format!("/{segment}/fullconsole/{name}/{CONSOLE_FILE_NAME}"),
                    artifacts_path: artifacts_root.join(&name),
                    artifacts_url: format!("/artifacts/{name}/"),
                    instance_id,
                    dir_name: name,
                    path,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not find an unused workspace name",
    ))
}

/// Resolve a workspace directory name from a request to its path.
pub fn resolve(layout: &WorkspaceLayout, name: &str) -> Option<PathBuf> {
    is_workspace_dir_name(name).then(|| layout.job_home.join(name))
}

/// Instance id encoded at the end of a workspace directory name.
pub fn instance_id_of(name: &str) -> Option<&str> {
    name.rsplit_once('_').map(|(_, id)| id).filter(|id| !id.is_empty())
}
