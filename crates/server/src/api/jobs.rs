//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use social_recipes_core::{Job, JobFilter, JobStatus, PendingUpload, SchedulerError};
use std::sync::Arc;
use tracing::error;

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    /// Social video URL
    pub url: String,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Only jobs that have not finished
    #[serde(default)]
    pub active: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A job plus the upload it is parked on, if any
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_upload: Option<PendingUpload>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("Job API error: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a video URL and queue its pipeline
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    match state
        .scheduler()
        .submit_and_start(&body.url, state.pipeline())
    {
        Ok(job) => Ok((StatusCode::CREATED, Json(job))),
        Err(SchedulerError::InvalidUrl(msg)) => Err(error_response(StatusCode::BAD_REQUEST, msg)),
        Err(SchedulerError::ShuttingDown) => Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Server is shutting down",
        )),
        Err(e) => Err(internal(e)),
    }
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = match state.job_store().get(&id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return Err(error_response(
                StatusCode::NOT_FOUND,
                format!("Job not found: {}", id),
            ))
        }
        Err(e) => return Err(internal(e)),
    };

    let pending_upload = if job.status == JobStatus::AwaitingConfirmation {
        state.gate().pending_for_job(&id).map_err(internal)?
    } else {
        None
    };

    Ok(Json(JobResponse {
        job,
        pending_upload,
    }))
}

/// List jobs, newest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref status) = params.status {
        match status.parse::<JobStatus>() {
            Ok(status) => filter = filter.with_status(status),
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e.to_string())),
        }
    }
    if params.active {
        filter = filter.active();
    }

    let jobs = state.job_store().list(&filter).map_err(internal)?;
    let total = state.job_store().count(&filter).map_err(internal)?;

    Ok(Json(ListJobsResponse {
        jobs,
        total,
        limit,
        offset,
    }))
}

/// Cancel a job
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = match state.job_store().get(&id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return Err(error_response(
                StatusCode::NOT_FOUND,
                format!("Job not found: {}", id),
            ))
        }
        Err(e) => return Err(internal(e)),
    };

    if job.is_terminal() {
        return Err(error_response(
            StatusCode::CONFLICT,
            format!("Job already {}", job.status),
        ));
    }

    match state.scheduler().cancel(&id) {
        Ok(true) => {}
        // Finished between the read and the cancel
        Ok(false) => {
            return Err(error_response(
                StatusCode::CONFLICT,
                "Job already finished".to_string(),
            ))
        }
        Err(e) => return Err(internal(e)),
    }

    match state.job_store().get(&id) {
        Ok(Some(job)) => Ok(Json(job)),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(internal(e)),
    }
}
