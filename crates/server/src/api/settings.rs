//! Runtime settings handlers.
//!
//! Changes apply to jobs started after the update; running jobs keep the
//! settings they started with.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use social_recipes_core::settings::SettingsError;
use social_recipes_core::{ExportTarget, RuntimeSettings, SettingsPatch};
use std::sync::Arc;
use tracing::error;

use super::handlers::{error_response, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Effective values
    pub settings: RuntimeSettings,
    /// Values from the configuration file
    pub defaults: RuntimeSettings,
    /// Targets with a configured exporter
    pub available_targets: Vec<ExportTarget>,
}

fn respond(state: &AppState, settings: RuntimeSettings) -> Json<SettingsResponse> {
    let service = state.settings();
    Json(SettingsResponse {
        settings,
        defaults: service.defaults().clone(),
        available_targets: service.available_targets().to_vec(),
    })
}

fn map_error(e: SettingsError) -> ApiError {
    match e {
        SettingsError::Invalid(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        e => {
            error!("Settings API error: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let current = state.settings().current();
    respond(&state, current)
}

/// Merge a partial update into the stored settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SettingsResponse>, ApiError> {
    if patch.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no settings given"));
    }
    let updated = state.settings().update(patch).map_err(map_error)?;
    Ok(respond(&state, updated))
}

/// Drop every stored override
pub async fn reset_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let reset = state.settings().reset().map_err(map_error)?;
    Ok(respond(&state, reset))
}
