//! # Sync API Handlers
//!
//! Sync triggers run to completion and answer with the finalized history
//! entry. A trigger that finds a run in progress gets 409
//! `SYNC_IN_PROGRESS` straight away.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};

use crate::error::ApiError;
use crate::handlers::types::{
    HistoryQuery, LockReleaseResponse, SyncHistoryView, SyncStatusResponse,
};
use crate::server::AppState;

#[utoipa::path(
    post,
    path = "/sync/all",
    responses(
        (status = 200, description = "Finalized history entry", body = SyncHistoryView),
        (status = 409, description = "A sync is already running", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_all(State(state): State<AppState>) -> Result<Json<SyncHistoryView>, ApiError> {
    let entry = state.orchestrator.sync_all().await?;
    Ok(Json(entry.into()))
}

#[utoipa::path(
    post,
    path = "/sync/providers/{id}",
    params(("id" = i32, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Finalized history entry", body = SyncHistoryView),
        (status = 404, description = "Provider not found", body = ApiError),
        (status = 409, description = "A sync is already running", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_provider(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SyncHistoryView>, ApiError> {
    let entry = state.orchestrator.sync_provider(id).await?;
    Ok(Json(entry.into()))
}

#[utoipa::path(
    post,
    path = "/sync/repositories/{id}",
    params(("id" = i32, Path, description = "Repository id")),
    responses(
        (status = 200, description = "Finalized history entry", body = SyncHistoryView),
        (status = 404, description = "Repository not found", body = ApiError),
        (status = 409, description = "A sync is already running", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn sync_repository(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SyncHistoryView>, ApiError> {
    let entry = state.orchestrator.sync_repository(id).await?;
    Ok(Json(entry.into()))
}

#[utoipa::path(
    get,
    path = "/sync/status",
    responses(
        (status = 200, description = "Whether a sync holds the lock", body = SyncStatusResponse)
    ),
    tag = "sync"
)]
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(state.orchestrator.status().into())
}

/// Clear a stuck sync lock
///
/// The abandoned run keeps whatever it already committed.
#[utoipa::path(
    post,
    path = "/sync/lock/release",
    responses(
        (status = 200, description = "Release outcome", body = LockReleaseResponse)
    ),
    tag = "sync"
)]
pub async fn release_lock(State(state): State<AppState>) -> Json<LockReleaseResponse> {
    Json(LockReleaseResponse {
        released: state.orchestrator.force_release_lock(),
    })
}

#[utoipa::path(
    get,
    path = "/sync/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Most recent runs first", body = Vec<SyncHistoryView>)
    ),
    tag = "sync"
)]
pub async fn sync_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SyncHistoryView>>, ApiError> {
    let entries = state.orchestrator.get_sync_history(query.limit).await?;
    Ok(Json(entries.into_iter().map(SyncHistoryView::from).collect()))
}
