//! History API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use social_recipes_core::history::HistoryError;
use social_recipes_core::progress::PublishError;
use social_recipes_core::{HistoryEntry, HistoryFilter, HistoryStatus};
use std::sync::Arc;
use tracing::{error, info};

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;
const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListHistoryParams {
    /// `success`, `failed` or `cancelled`
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListHistoryResponse {
    pub entries: Vec<HistoryEntry>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn map_error(e: HistoryError) -> ApiError {
    match e {
        HistoryError::NotFound(id) => error_response(
            StatusCode::NOT_FOUND,
            format!("History entry not found: {}", id),
        ),
        e => {
            error!("History API error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// List finished jobs, newest first
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListHistoryParams>,
) -> Result<Json<ListHistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = HistoryFilter::new().with_limit(limit).with_offset(offset);
    if let Some(ref status) = params.status {
        let status: HistoryStatus = status
            .parse()
            .map_err(|e: String| error_response(StatusCode::BAD_REQUEST, e))?;
        filter = filter.with_status(status);
    }

    let entries = state.history().list(&filter).map_err(map_error)?;
    let total = state.history().count(&filter).map_err(map_error)?;

    Ok(Json(ListHistoryResponse {
        entries,
        total,
        limit,
        offset,
    }))
}

/// Get the history entry of a job
pub async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<HistoryEntry>, ApiError> {
    match state.history().get(&job_id).map_err(map_error)? {
        Some(entry) => Ok(Json(entry)),
        None => Err(map_error(HistoryError::NotFound(job_id))),
    }
}

/// Delete a history entry along with the finished job it describes
pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.publisher().forget_job(&job_id) {
        Ok(_) => {}
        Err(PublishError::History(e)) => return Err(map_error(e)),
        Err(e) => {
            error!("Failed to delete job {}: {}", job_id, e);
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    }
    info!(job_id = %job_id, "History entry and job record deleted");
    Ok(StatusCode::NO_CONTENT)
}
