//! # Repositories API Handlers

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};

use crate::error::ApiError;
use crate::handlers::types::{AddRepositoryRequest, RepositoryListQuery, RepositoryView};
use crate::server::AppState;

/// List tracked repositories, optionally for one provider
#[utoipa::path(
    get,
    path = "/repositories",
    params(RepositoryListQuery),
    responses(
        (status = 200, description = "Tracked repositories ordered by id", body = Vec<RepositoryView>)
    ),
    tag = "repositories"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
    Query(query): Query<RepositoryListQuery>,
) -> Result<Json<Vec<RepositoryView>>, ApiError> {
    let repositories = state.repositories.list(query.provider_id).await?;
    Ok(Json(
        repositories.into_iter().map(RepositoryView::from).collect(),
    ))
}

/// Start tracking a repository
///
/// Metadata is fetched from the provider, so the provider needs a token.
#[utoipa::path(
    post,
    path = "/repositories",
    request_body = AddRepositoryRequest,
    responses(
        (status = 201, description = "Repository added", body = RepositoryView),
        (status = 400, description = "URL does not belong to the provider", body = ApiError),
        (status = 404, description = "Provider or remote repository not found", body = ApiError),
        (status = 409, description = "Repository already tracked", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn add_repository(
    State(state): State<AppState>,
    payload: Result<Json<AddRepositoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RepositoryView>), ApiError> {
    let Json(request) = payload?;
    let model = state
        .repositories
        .add(request.provider_id, &request.web_url)
        .await?;
    Ok((StatusCode::CREATED, Json(model.into())))
}

#[utoipa::path(
    get,
    path = "/repositories/{id}",
    params(("id" = i32, Path, description = "Repository id")),
    responses(
        (status = 200, description = "Repository with per-resource sync status", body = RepositoryView),
        (status = 404, description = "Repository not found", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<RepositoryView>, ApiError> {
    Ok(Json(state.repositories.get(id).await?.into()))
}

/// Stop tracking a repository and drop its synced resources
#[utoipa::path(
    delete,
    path = "/repositories/{id}",
    params(("id" = i32, Path, description = "Repository id")),
    responses(
        (status = 204, description = "Repository deleted"),
        (status = 404, description = "Repository not found", body = ApiError)
    ),
    tag = "repositories"
)]
pub async fn delete_repository(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.repositories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
