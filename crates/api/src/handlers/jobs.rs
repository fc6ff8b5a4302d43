//! Handlers for triggering, cancelling and inspecting job instances.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bacillus_core::engine::LaunchRequest;
use bacillus_core::hook::HookEvent;
use bacillus_core::jobs::CancelOutcome;
use bacillus_core::params::sanitize_param_value;
use bacillus_core::types::InstanceId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query keys with a meaning of their own; never forwarded as parameters.
const RESERVED_QUERY_KEYS: [&str; 4] = ["param", "usingParams", "ref", "new"];

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Body of an accepted launch.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub instance_id: InstanceId,
    pub tag: String,
}

/// GET|POST /{tag}
///
/// Launch an instance of the job `tag`. A `POST` body may carry a webhook
/// push event; raw git hooks pass `?ref=` and `?new=` instead.
///
/// - `?param` returns the job's declared parameters instead of launching.
/// - `?usingParams&NAME=value...` passes the remaining query pairs to the
///   job environment, sanitised per parameter name.
///
/// Returns 202 with the new instance id.
pub async fn trigger_job(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> AppResult<Response> {
    let has_key = |key: &str| query.iter().any(|(k, _)| k == key);
    let value_of = |key: &str| {
        query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    };

    if has_key("param") {
        let specs = state.engine.params_of(&tag).await?;
        return Ok(Json(DataResponse { data: specs }).into_response());
    }

    let mut hook = HookEvent::from_body(&body);
    hook.merge_query(value_of("ref"), value_of("new"));

    let params = if has_key("usingParams") {
        job_params(&query)?
    } else {
        Vec::new()
    };

    let request = LaunchRequest::new(tag.clone())
        .with_env(params)
        .with_hook(hook);
    let instance_id = state.engine.launch(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: TriggerResponse { instance_id, tag },
        }),
    )
        .into_response())
}

/// Collect submitted parameters as environment pairs.
fn job_params(query: &[(String, String)]) -> AppResult<Vec<(String, String)>> {
    query
        .iter()
        .filter(|(k, _)| !RESERVED_QUERY_KEYS.contains(&k.as_str()))
        .map(|(name, value)| {
            if !is_env_name(name) {
                return Err(AppError::BadRequest(format!(
                    "Invalid parameter name '{name}'"
                )));
            }
            Ok((name.clone(), sanitize_param_value(name, value)))
        })
        .collect()
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub instance_id: InstanceId,
    pub outcome: CancelOutcome,
}

/// GET /cancel?id={instance_id}
///
/// Ask a running instance to terminate. Returns immediately; the completion
/// line is written once the process has gone. 404 if nothing with that id
/// is running.
pub async fn cancel_job(
    State(state): State<AppState>,
    Query(CancelQuery { id }): Query<CancelQuery>,
) -> AppResult<impl IntoResponse> {
    match state.engine.cancel(&id) {
        CancelOutcome::Cancelled => Ok(Json(DataResponse {
            data: CancelResponse {
                instance_id: id,
                outcome: CancelOutcome::Cancelled,
            },
        })),
        CancelOutcome::NotFound => Err(AppError::NotFound(format!("No running job with id {id}"))),
    }
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

/// GET /api/jobs
///
/// Running instances, oldest first.
pub async fn list_running(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.engine.running_jobs(),
    })
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub instance_id: InstanceId,
    /// `None` until the job writes its stage file.
    pub stage: Option<String>,
}

/// GET /api/jobs/{id}/stage
///
/// Current stage text of a running instance.
pub async fn job_stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    if state.engine.registry().lookup(&id).is_none() {
        return Err(AppError::NotFound(format!("No running job with id {id}")));
    }
    let stage = state.engine.stage_of(&id).await;
    Ok(Json(DataResponse {
        data: StageResponse {
            instance_id: id,
            stage,
        },
    }))
}

/// GET /api/params/{tag}
pub async fn job_params_spec(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> AppResult<impl IntoResponse> {
    let specs = state.engine.params_of(&tag).await?;
    Ok(Json(DataResponse { data: specs }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn params_skip_reserved_keys_and_are_sanitised() {
        let query = pairs(&[
            ("usingParams", ""),
            ("ref", "refs/heads/main"),
            ("TARGET", "../../etc/passwd"),
            ("REPO_URI", "https://example.com/../x"),
        ]);
        let params = job_params(&query).unwrap();
        assert_eq!(
            params,
            pairs(&[
                ("TARGET", "etc/passwd"),
                ("REPO_URI", "https://example.com/../x"),
            ])
        );
    }

    #[test]
    fn params_reject_invalid_names() {
        let query = pairs(&[("usingParams", ""), ("BAD=NAME", "x")]);
        assert!(matches!(job_params(&query), Err(AppError::BadRequest(_))));
        assert!(!is_env_name("1ABC"));
        assert!(!is_env_name(""));
        assert!(is_env_name("_A1"));
    }
}
