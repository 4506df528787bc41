use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    execution::{python, Outcome},
    process::ExecError,
    safety::Verdict,
};

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExecuteRequest {
    code: Option<String>,
    /// Lets a duplex client register before the response arrives.
    process_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExecuteResponse {
    output: String,
    execution_time: f64,
    process_id: String,
}

pub(super) async fn execute(
    State(state): State<AppState>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| {
        warn!(error = %e, "unreadable execute request");
        ApiError::MalformedBody
    })?;
    let code = req
        .code
        .filter(|c| !c.is_empty())
        .ok_or(ApiError::MissingCode)?;

    if let Verdict::Rejected { rule } = state.patterns.screen(&code) {
        warn!(rule, "submission rejected by danger patterns");
        return Err(ApiError::Forbidden);
    }

    let process_id = match req.process_id {
        Some(id) => Uuid::parse_str(&id)
            .map_err(|_| ApiError::InvalidProcessId)?
            .to_string(),
        None => Uuid::new_v4().to_string(),
    };
    if state.supervisor.registry().contains(&process_id) {
        return Err(ApiError::SessionConflict);
    }

    let source = python::prepare(&code, state.settings.recursion_limit);
    let script = state
        .scripts
        .write(&source)
        .await
        .map_err(ApiError::ScratchWrite)?;

    // Detached so a dropped request cannot skip cleanup.
    let supervisor = state.supervisor.clone();
    let id = process_id.clone();
    let outcome = tokio::spawn(async move { supervisor.run(id, script).await })
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("supervisor task failed: {e}")))?;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(ExecError::Spawn(e)) => return Err(ApiError::Spawn(e)),
        Err(ExecError::Registry(_)) => return Err(ApiError::SessionConflict),
    };
    info!(session = %process_id, outcome = outcome.label(), "execution finished");

    let status = match outcome {
        Outcome::Succeeded { .. } | Outcome::Failed { .. } => StatusCode::OK,
        Outcome::TimedOut { .. } => StatusCode::REQUEST_TIMEOUT,
        Outcome::Crashed { output } => return Err(ApiError::ProcessIo { output }),
    };
    let execution_time = outcome.execution_time().unwrap_or_default();
    let body = ExecuteResponse {
        output: outcome.output().to_string(),
        execution_time,
        process_id,
    };
    Ok((status, Json(body)).into_response())
}

pub(super) async fn tutorial(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.tutorials.tutorial(&id).await {
        Ok(Some(value)) => Ok(Json(value)),
        Ok(None) => Err(ApiError::NotFound("Tutorial")),
        Err(e) => Err(ApiError::Lookup("tutorial", e)),
    }
}

pub(super) async fn section(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.tutorials.section(&id).await {
        Ok(Some(value)) => Ok(Json(value)),
        Ok(None) => Err(ApiError::NotFound("Section")),
        Err(e) => Err(ApiError::Lookup("section", e)),
    }
}
