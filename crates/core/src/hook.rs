//! Inbound webhook payloads.
//!
//! SCM managers (gogs, gitea, github, gitlab) POST a JSON push event to a job
//! endpoint. Only the fields that feed the job environment are modelled; any
//! other content is ignored, and a missing or malformed body is treated as an
//! empty event.

use serde::{Deserialize, Serialize};

/// Author of a pushed commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
}

/// One commit carried by a push event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: HookAuthor,
}

/// A push event as delivered by a webhook (or synthesised from the query
/// string of a raw git hook request).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEvent {
    /// Full ref name, e.g. `refs/heads/main`.
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
    #[serde(default)]
    pub compare_url: String,
    #[serde(default)]
    pub commits: Vec<HookCommit>,
}

impl HookEvent {
    /// Parse a request body, falling back to an empty event when the body is
    /// absent or is not a JSON push event.
    pub fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring non-JSON hook body");
                Self::default()
            }
        }
    }

    /// Merge the `?ref=` and `?new=` parameters of a raw git hook request.
    ///
    /// `ref` only applies when the JSON body did not already set one; `new`
    /// is appended as an additional commit id.
    pub fn merge_query(&mut self, git_ref: Option<&str>, new_commit: Option<&str>) {
        if self.git_ref.is_empty() {
            if let Some(r) = git_ref {
                self.git_ref = r.to_string();
            }
        }
        if let Some(id) = new_commit {
            self.commits.push(HookCommit {
                id: id.to_string(),
                ..HookCommit::default()
            });
        }
    }

    /// The ref with `refs/` and `heads/` prefixes stripped, if a ref was given.
    pub fn normalized_ref(&self) -> Option<&str> {
        if self.git_ref.is_empty() {
            return None;
        }
        Some(normalize_ref(&self.git_ref))
    }

    /// Id of the first commit in the event, if any.
    pub fn first_commit_id(&self) -> Option<&str> {
        self.commits.first().map(|c| c.id.as_str())
    }
}

/// Strip a leading `refs/` and then a leading `heads/` from a ref name.
///
/// `refs/heads/main` becomes `main`; `refs/tags/v1` becomes `tags/v1`.
pub fn normalize_ref(git_ref: &str) -> &str {
    let r = git_ref.strip_prefix("refs/").unwrap_or(git_ref);
    r.strip_prefix("heads/").unwrap_or(r)
}
