//! Render job handlers: submit, poll, download, cancel.

use std::sync::LazyLock;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use vrender_models::{Job, JobId, JobStatus, RenderSpec};
use vrender_storage::ArtifactLocation;
use vrender_worker::QueueSnapshot;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// File name used when a job carries no project name.
const DEFAULT_PROJECT_NAME: &str = "render";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid filename regex"));

/// `?jobId=` query parameter shared by the polling endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    #[serde(default)]
    pub job_id: Option<String>,
}

impl JobQuery {
    fn job_id(&self) -> ApiResult<JobId> {
        self.job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(JobId::from)
            .ok_or_else(|| ApiError::bad_request("Missing jobId"))
    }
}

/// Response to an accepted submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub poll_url: String,
    pub download_url: String,
}

/// Client-facing view of a job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
            cost: job.cost,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            cancelled: job.cancelled,
        }
    }
}

/// Returned by the download endpoint while the render is still running.
#[derive(Debug, Serialize)]
pub struct DownloadPendingResponse {
    pub status: JobStatus,
    pub progress: u8,
    pub retryable: bool,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatusResponse>,
}

/// Submit a render.
///
/// The renderer credentials are checked before anything else so a
/// misconfigured deployment never accepts work it cannot run.
pub async fn submit_render(
    State(state): State<AppState>,
    user: Result<AuthUser, ApiError>,
    body: Result<Json<RenderSpec>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    state.worker.ensure_credentials()?;
    let user = user?;

    let Json(payload) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    payload.validate()?;

    let job_id = state.executor.submit(&user.uid, payload).await?;
    info!(job_id = %job_id, user_id = %user.uid, "Render submitted");

    let response = SubmitResponse {
        poll_url: state
            .config
            .public_url(&format!("/api/render/status?jobId={}", job_id)),
        download_url: state
            .config
            .public_url(&format!("/api/render/download?jobId={}", job_id)),
        status: JobStatus::Pending,
        job_id,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Poll a job. Any caller holding the id may read its status.
pub async fn get_render_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = query.job_id()?;
    let job = state.executor.get(&job_id).await?;
    Ok(Json(job.into()))
}

/// Download the finished video.
pub async fn download_render(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<JobQuery>,
) -> ApiResult<Response> {
    let job_id = query.job_id()?;
    let job = owned_job(&state, &user, &job_id).await?;

    match job.status {
        JobStatus::Pending | JobStatus::Processing => {
            let body = DownloadPendingResponse {
                status: job.status,
                progress: job.progress,
                retryable: true,
            };
            return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
        }
        JobStatus::Failed => {
            return Err(ApiError::RenderFailed(
                job.error
                    .unwrap_or_else(|| "Render failed with an unknown error".to_string()),
            ))
        }
        JobStatus::Cancelled => {
            return Err(ApiError::Gone(format!("Job {} was cancelled", job_id)))
        }
        JobStatus::Completed => {}
    }

    let result = job
        .result
        .as_deref()
        .ok_or_else(|| ApiError::internal("Completed job has no result"))?;
    let location = ArtifactLocation::parse(result)?;

    // The renderer reports the URL slightly before the object is readable.
    if !state.config.download_delay.is_zero() {
        tokio::time::sleep(state.config.download_delay).await;
    }

    let bytes = state.storage.download_bytes(&location).await?;
    metrics::record_download(bytes.len());
    info!(job_id = %job_id, user_id = %user.uid, size = bytes.len(), "Serving rendered video");

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_filename(job.project_name(), &job_id)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::internal(format!("Invalid Content-Disposition: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Cancel a job the caller owns.
pub async fn cancel_render(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = query.job_id()?;
    owned_job(&state, &user, &job_id).await?;

    let job = state.executor.cancel(&job_id).await?;
    Ok(Json(job.into()))
}

/// List the caller's jobs, newest first.
pub async fn list_render_jobs(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<JobListResponse> {
    let jobs = state.executor.list_for_user(&user.uid).await;
    Json(JobListResponse {
        jobs: jobs.into_iter().map(Into::into).collect(),
    })
}

/// Queue counters plus the caller's place in line.
pub async fn get_queue_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<QueueSnapshot> {
    Json(state.executor.queue_snapshot(&user.uid).await)
}

/// Fetch a job and reject callers who do not own it.
async fn owned_job(state: &AppState, user: &AuthUser, job_id: &JobId) -> ApiResult<Job> {
    let job = state.executor.get(job_id).await?;
    if job.user_id != user.uid {
        warn!(job_id = %job_id, user_id = %user.uid, "Rejected access to another user's job");
        return Err(ApiError::forbidden("You do not own this job"));
    }
    Ok(job)
}

/// `<project>-<jobId>.mp4` with the project name reduced to safe characters.
fn download_filename(project_name: Option<&str>, job_id: &JobId) -> String {
    let project = project_name
        .map(|name| {
            UNSAFE_FILENAME_CHARS
                .replace_all(name.trim(), "-")
                .trim_matches('-')
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
    format!("{}-{}.mp4", project, job_id)
}
