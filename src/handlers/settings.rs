//! # Settings API Handlers

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};

use crate::error::ApiError;
use crate::server::AppState;
use crate::settings::SyncSettings;

#[utoipa::path(
    get,
    path = "/settings",
    responses(
        (status = 200, description = "Current auto-sync settings", body = SyncSettings)
    ),
    tag = "settings"
)]
pub async fn get_settings(State(state): State<AppState>) -> Json<SyncSettings> {
    Json(state.settings.get().await)
}

/// Replace the auto-sync settings
///
/// Takes effect on the scheduler's next tick.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = SyncSettings,
    responses(
        (status = 200, description = "Updated settings", body = SyncSettings),
        (status = 400, description = "Interval below one minute", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<SyncSettings>, JsonRejection>,
) -> Result<Json<SyncSettings>, ApiError> {
    let Json(settings) = payload?;
    Ok(Json(state.settings.update(settings).await?))
}
