//! The environment contract between the engine and job processes.
//!
//! Job processes start from an empty environment. Variables are applied in
//! this order, later entries shadowing earlier ones with the same name:
//!
//! 1. inherited identity: `USER`, `HOME`, `PATH`
//! 2. engine-provided: `BACILLUS_JOBID`, `BACILLUS_JOBTAG`,
//!    `BACILLUS_WORKDIR`, `BACILLUS_ARTFDIR`
//! 3. hook-derived (only when present): `BACILLUS_REF`, `BACILLUS_COMMITID`
//! 4. caller-supplied: the descriptor's static env, then job parameters

use crate::hook::HookEvent;
use crate::jobs::workspace::Workspace;

pub const ENV_JOB_ID: &str = "BACILLUS_JOBID";
pub const ENV_JOB_TAG: &str = "BACILLUS_JOBTAG";
pub const ENV_WORKDIR: &str = "BACILLUS_WORKDIR";
pub const ENV_ARTIFACTS_DIR: &str = "BACILLUS_ARTFDIR";
pub const ENV_REF: &str = "BACILLUS_REF";
pub const ENV_COMMIT_ID: &str = "BACILLUS_COMMITID";

/// Variables copied from the server's own environment (empty when unset).
pub const INHERITED_VARS: [&str; 3] = ["USER", "HOME", "PATH"];

/// Ordered list of environment assignments for one job process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobEnvironment {
    vars: Vec<(String, String)>,
}

impl JobEnvironment {
    /// Build the full environment for an instance.
    pub fn for_instance(
        workspace: &Workspace,
        tag: &str,
        hook: &HookEvent,
        extra: &[(String, String)],
    ) -> Self {
        let mut env = Self::default();
        for name in INHERITED_VARS {
            env.set(name, std::env::var(name).unwrap_or_default());
        }
        env.set(ENV_JOB_ID, &workspace.instance_id);
        env.set(ENV_JOB_TAG, tag);
        env.set(ENV_WORKDIR, workspace.path.to_string_lossy());
        env.set(ENV_ARTIFACTS_DIR, workspace.artifacts_path.to_string_lossy());
        if let Some(r) = hook.normalized_ref() {
            env.set(ENV_REF, r);
        }
        if let Some(id) = hook.first_commit_id() {
            env.set(ENV_COMMIT_ID, id);
        }
        for (name, value) in extra {
            env.set(name, value);
        }
        env
    }

    /// Append an assignment; it shadows any earlier one with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.push((name.into(), value.into()));
        self
    }

    /// All assignments in application order, including shadowed ones.
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// The effective value of `name`, i.e. its last assignment.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the child's environment with these assignments.
    pub fn apply(&self, cmd: &mut tokio::process::Command) {
        cmd.env_clear();
        for (name, value) in &self.vars {
            cmd.env(name, value);
        }
    }
}
