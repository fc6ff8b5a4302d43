//! The job descriptor table: job tag -> command line, options and static env.
//!
//! Descriptors are loaded once at startup from endpoint specs of the form
//!
//! ```text
//! tag:jobOpts:ENV1=v1,ENV2=v2:command args...
//! ```
//!
//! and never change afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CoreError;

/// Number of `:`-separated fields in an endpoint spec.
const SPEC_FIELDS: usize = 4;

/// Tags taken by the server's own top-level endpoints.
pub const RESERVED_TAGS: &[&str] = &[
    "cancel",
    "runlog",
    "fullrunlog",
    "shutdown",
    "cancelshutdown",
    "rudeshutdown",
    "health",
];

/// A job a client can trigger, bound to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    /// Unique endpoint identifier. Never contains `_`.
    pub tag: String,
    /// Free-form option string, embedded in workspace and artifact names.
    pub options: String,
    /// Static environment variables declared with the endpoint.
    pub env: Vec<(String, String)>,
    /// Command line: program followed by whitespace-separated arguments.
    pub command: String,
}

impl JobDescriptor {
    /// Parse one endpoint spec.
    ///
    /// Returns `Ok(None)` for arguments that are not endpoint specs at all
    /// (no `:`), and a validation error for specs with the wrong shape.
    pub fn parse(spec: &str) -> Result<Option<Self>, CoreError> {
        if !spec.contains(':') {
            return Ok(None);
        }
        let fields: Vec<&str> = spec.splitn(SPEC_FIELDS, ':').collect();
        if fields.len() != SPEC_FIELDS {
            return Err(CoreError::Validation(format!(
                "[{}] endpoint specs must have exactly 4 fields: endpoint:jobOpts:envVars:cmd \
                 (jobOpts and envVars may be empty)",
                fields[0]
            )));
        }

        // `_` separates the parts of workspace names, so it may not appear in a tag.
        let tag = fields[0].replace('_', "-");
        if tag.is_empty() {
            return Err(CoreError::Validation(format!("[{spec}] endpoint tag is empty")));
        }
        if RESERVED_TAGS.contains(&tag.as_str()) {
            return Err(CoreError::Validation(format!(
                "[{tag}] endpoint tag is reserved by the server"
            )));
        }
        let command = fields[3].trim().to_string();
        if command.is_empty() {
            return Err(CoreError::Validation(format!("[{tag}] endpoint command is empty")));
        }

        let env = fields[2]
            .split(',')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                pair.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .ok_or_else(|| {
                        CoreError::Validation(format!(
                            "[{tag}] environment entry '{pair}' is not NAME=value"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            tag,
            options: fields[1].to_string(),
            env,
            command,
        }))
    }

    /// The program and its arguments.
    pub fn program_and_args(&self) -> (&str, Vec<&str>) {
        let mut parts = self.command.split_whitespace();
        let program = parts.next().unwrap_or_default();
        (program, parts.collect())
    }

    /// Location of the job's script on disk, as seen from the server.
    ///
    /// Commands run inside a workspace directly below the job home, so a
    /// program written as `../build.sh` lives in the job home itself.
    pub fn script_path(&self, job_home: &Path) -> PathBuf {
        let (program, _) = self.program_and_args();
        match program.strip_prefix("../") {
            Some(rest) => job_home.join(rest),
            None => PathBuf::from(program),
        }
    }
}

/// Read-only table of all jobs served by this instance, keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: BTreeMap<String, JobDescriptor>,
}

impl JobTable {
    /// Build the table from endpoint specs, ignoring non-spec arguments.
    /// A later spec with the same tag replaces an earlier one.
    pub fn from_specs<I, S>(specs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::default();
        for spec in specs {
            if let Some(descriptor) = JobDescriptor::parse(spec.as_ref())? {
                table.insert(descriptor);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, descriptor: JobDescriptor) {
        self.jobs.insert(descriptor.tag.clone(), descriptor);
    }

    pub fn get(&self, tag: &str) -> Option<&JobDescriptor> {
        self.jobs.get(tag)
    }

    /// All descriptors, sorted by tag.
    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
