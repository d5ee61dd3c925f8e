//! Upload confirmation handlers.
//!
//! Confirm and cancel only succeed while the upload is pending; a second
//! decision, or one arriving after expiry, gets 404.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use social_recipes_core::confirmation::ConfirmationError;
use social_recipes_core::{PendingUpload, PendingUploadError};
use std::sync::Arc;
use tracing::error;

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

/// Optional body of a confirm request
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmBody {
    /// Overrides the automatically selected image
    pub selected_image_index: Option<usize>,
}

pub(crate) fn map_error(e: ConfirmationError) -> ApiError {
    match e {
        ConfirmationError::Store(PendingUploadError::NotFound(id)) => error_response(
            StatusCode::NOT_FOUND,
            format!("Pending upload not found or already resolved: {}", id),
        ),
        ConfirmationError::Store(e @ PendingUploadError::InvalidImageIndex { .. }) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        e => {
            error!("Upload API error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Get an upload, pending or resolved
pub async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PendingUpload>, ApiError> {
    match state.gate().get(&id).map_err(map_error)? {
        Some(upload) => Ok(Json(upload)),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Upload not found: {}", id),
        )),
    }
}

/// Approve an upload
pub async fn confirm_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PendingUpload>, ApiError> {
    let body: ConfirmBody = if body.iter().all(u8::is_ascii_whitespace) {
        ConfirmBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("Invalid body: {}", e)))?
    };

    let upload = state
        .gate()
        .confirm(&id, body.selected_image_index)
        .map_err(map_error)?;
    Ok(Json(upload))
}

/// Reject an upload; the job ends cancelled
pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PendingUpload>, ApiError> {
    let upload = state.gate().cancel(&id).map_err(map_error)?;
    Ok(Json(upload))
}
