//! HTTP route handlers for the job API.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tracing::error;

use crate::orchestrator::{OrchestratorError, StatusReport};
use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/schedule", post(schedule))
        .route("/status/{job_id}", get(status))
        .route("/download/{job_id}", get(download))
}

/// Error body returned to callers: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let (status, detail) = match &err {
            OrchestratorError::NotFound(_) => (StatusCode::NOT_FOUND, "Job not found"),
            OrchestratorError::ArtifactNotFound(_) => (StatusCode::NOT_FOUND, "Output not found"),
            OrchestratorError::InvalidTask => (StatusCode::BAD_REQUEST, "No task provided"),
            OrchestratorError::Launch { .. } => {
                error!(err = %err, "schedule failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to schedule job")
            }
            OrchestratorError::Job(_) => {
                error!(err = %err, "job directory access failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        Self {
            status,
            detail: detail.to_string(),
        }
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "Coding Agent API is running" }))
}

/// POST /schedule - body is `{"task": "..."}` or the task as plain text.
async fn schedule(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let task = task_from_body(&body);
    let orchestrator = state.orchestrator.clone();
    let job_id = blocking(move || orchestrator.schedule(&task)).await??;
    Ok(Json(json!({ "job_id": job_id })))
}

/// GET /status/{job_id}
async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let report = blocking(move || orchestrator.status(&job_id)).await??;
    Ok(Json(report))
}

/// GET /download/{job_id} - the job's `output.zip`.
async fn download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let path = blocking(move || orchestrator.artifact_path(&job_id)).await??;
    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        error!(path = %path.display(), err = %err, "failed to read archive");
        ApiError::internal()
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"output.zip\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Run job directory I/O on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        error!(err = %err, "blocking task failed");
        ApiError::internal()
    })
}

/// A JSON object yields its `task` field; any other body is taken as raw text.
fn task_from_body(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}
