//! Handlers for the `/jobs` resource.
//!
//! Submission returns immediately with a job id; callers observe progress
//! and retrieve the outcome by polling `GET /jobs/{id}`. Poll responses
//! never block on job execution -- they are snapshots from the store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use mediseg_core::error::CoreError;
use mediseg_core::job::{Job, JobListQuery, SubmitJobRequest};
use mediseg_core::types::{JobId, Timestamp};
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Response for `POST /jobs`.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: &'static str,
}

/// Response for `GET /jobs/{id}` and the elements of `GET /jobs`.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: &'static str,
    pub case_id: String,
    pub mode: &'static str,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    pub elapsed_seconds: i64,
    /// Present iff `status == "completed"`; the runner payload verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present iff `status == "failed"`; sanitized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobView {
    fn from_snapshot(job: &Job, now: Timestamp) -> Self {
        Self {
            job_id: job.id,
            status: job.status().as_str(),
            case_id: job.input.case_id.clone(),
            mode: job.input.mode.as_str(),
            progress: job.progress(),
            progress_message: job.progress_message().map(str::to_string),
            elapsed_seconds: job.elapsed_seconds(now),
            result: job.result().cloned(),
            error: job.error().map(str::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a new segmentation job. Validation failures and queue overload
/// are rejected synchronously; on success the job is `pending` and a 202
/// is returned without waiting for execution.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = state.dispatcher.submit(&request)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmitResponse {
                job_id,
                status: "pending",
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Poll one job. Unknown ids -- including ones already reclaimed by the
/// garbage collector -- return 404.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .store
        .get(job_id)
        .ok_or(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        })?;

    Ok(Json(DataResponse {
        data: JobView::from_snapshot(&job, Utc::now()),
    }))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List jobs, newest first. Supports optional `status` and `limit` query
/// parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let jobs: Vec<JobView> = state
        .store
        .list(&params)
        .iter()
        .map(|job| JobView::from_snapshot(job, now))
        .collect();

    Ok(Json(DataResponse { data: jobs }))
}
