//! Spawning job processes and waiting for them.
//!
//! [`spawn_job`] builds a [`tokio::process::Command`] from a descriptor, a
//! workspace and a prepared environment, wiring the process's stdout and
//! stderr to the console artifact. [`wait_for_exit`] then waits for either
//! natural exit or cancellation, and [`Termination::status`] maps the result
//! onto the 0-255 status recorded in the console header.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::jobs::console::KILLED_STATUS;
use crate::jobs::descriptor::JobDescriptor;
use crate::jobs::environment::JobEnvironment;
use crate::jobs::workspace::Workspace;

/// Where a job's output goes.
#[derive(Debug)]
pub enum JobOutput {
    /// Append to the console artifact (the file handle is positioned after
    /// the preamble).
    Console(std::fs::File),
    /// Share the server's own stdout/stderr.
    Inherit,
}

/// How a job process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitStatus),
    Cancelled,
}

impl Termination {
    /// Status for the console header: the exit code truncated to 0-255, or
    /// [`KILLED_STATUS`] for a process that was cancelled or killed by a
    /// signal.
    pub fn status(&self) -> u8 {
        match self {
            Self::Exited(status) => status
                .code()
                .map(|code| (code & 0xff) as u8)
                .unwrap_or(KILLED_STATUS),
            Self::Cancelled => KILLED_STATUS,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Resolve the program to execute. Relative paths containing a separator are
/// taken relative to the workspace, which is also the working directory.
pub fn resolve_program(program: &str, workdir: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && program.contains('/') {
        workdir.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Start the job process for `descriptor` inside `workspace`.
pub fn spawn_job(
    descriptor: &JobDescriptor,
    workspace: &Workspace,
    env: &JobEnvironment,
    output: JobOutput,
) -> io::Result<Child> {
    let (program, args) = descriptor.program_and_args();
    let mut cmd = Command::new(resolve_program(program, &workspace.path));
    cmd.args(args)
        .current_dir(&workspace.path)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    env.apply(&mut cmd);

    match output {
        JobOutput::Console(file) => {
            let stderr = file.try_clone()?;
            cmd.stdout(Stdio::from(file)).stderr(Stdio::from(stderr));
        }
        JobOutput::Inherit => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
    }

    // Own process group, so cancellation reaches everything the script starts.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

/// Wait until `child` exits or `cancel` fires.
///
/// On cancellation the process (and its process group) is killed and then
/// reaped before returning, so the caller never leaves a zombie behind.
pub async fn wait_for_exit(child: &mut Child, cancel: &CancellationToken) -> io::Result<Termination> {
    tokio::select! {
        status = child.wait() => Ok(Termination::Exited(status?)),
        _ = cancel.cancelled() => {
            kill_process_group(child);
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "Job process already gone");
            }
            child.wait().await?;
            Ok(Termination::Cancelled)
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // Safety: killpg takes no pointers; the child is not yet reaped, so its
    // pid still names the group created for it at spawn.
    let ret = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if ret != 0 {
        tracing::debug!(pid, error = %io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}
