//! # Resource API Handlers
//!
//! Paginated lists, state counts and single-item lookups for issues, pull
//! requests and workflow runs. All three share [`ListQuery`].

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Json,
};

use crate::error::ApiError;
use crate::handlers::types::ListQuery;
use crate::query::{IssueView, PaginatedResponse, PullRequestView, StateCounts, WorkflowView};
use crate::server::AppState;

type ListParams = Result<Query<ListQuery>, QueryRejection>;

#[utoipa::path(
    get,
    path = "/issues",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of issues, newest first", body = PaginatedResponse<IssueView>),
        (status = 400, description = "Unknown state or malformed query", body = ApiError)
    ),
    tag = "issues"
)]
pub async fn list_issues(
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<PaginatedResponse<IssueView>>, ApiError> {
    let Query(query) = params?;
    let page = state
        .queries
        .list_issues(&query.filters(), query.pagination())
        .await?;
    Ok(Json(page))
}

/// Issue counts by canonical state
///
/// Every filter except `state` applies.
#[utoipa::path(
    get,
    path = "/issues/stats",
    params(ListQuery),
    responses(
        (status = 200, description = "Counts per state", body = StateCounts),
        (status = 400, description = "Malformed query", body = ApiError)
    ),
    tag = "issues"
)]
pub async fn issue_stats(
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<StateCounts>, ApiError> {
    let Query(query) = params?;
    Ok(Json(state.queries.issue_stats(&query.filters()).await?))
}

#[utoipa::path(
    get,
    path = "/issues/{id}",
    params(("id" = i32, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue", body = IssueView),
        (status = 404, description = "Issue not found", body = ApiError)
    ),
    tag = "issues"
)]
pub async fn get_issue(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<IssueView>, ApiError> {
    Ok(Json(state.queries.get_issue(id).await?))
}

#[utoipa::path(
    get,
    path = "/pull-requests",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of pull requests, newest first", body = PaginatedResponse<PullRequestView>),
        (status = 400, description = "Unknown state or malformed query", body = ApiError)
    ),
    tag = "pull-requests"
)]
pub async fn list_pull_requests(
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<PaginatedResponse<PullRequestView>>, ApiError> {
    let Query(query) = params?;
    let page = state
        .queries
        .list_pull_requests(&query.filters(), query.pagination())
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/pull-requests/stats",
    params(ListQuery),
    responses(
        (status = 200, description = "Counts per state", body = StateCounts),
        (status = 400, description = "Malformed query", body = ApiError)
    ),
    tag = "pull-requests"
)]
pub async fn pull_request_stats(
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<StateCounts>, ApiError> {
    let Query(query) = params?;
    Ok(Json(state.queries.pull_request_stats(&query.filters()).await?))
}

#[utoipa::path(
    get,
    path = "/pull-requests/{id}",
    params(("id" = i32, Path, description = "Pull request id")),
    responses(
        (status = 200, description = "Pull request", body = PullRequestView),
        (status = 404, description = "Pull request not found", body = ApiError)
    ),
    tag = "pull-requests"
)]
pub async fn get_pull_request(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<PullRequestView>, ApiError> {
    Ok(Json(state.queries.get_pull_request(id).await?))
}

#[utoipa::path(
    get,
    path = "/workflows",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of workflow runs, newest first", body = PaginatedResponse<WorkflowView>),
        (status = 400, description = "Unknown state or malformed query", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn list_workflows(
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<PaginatedResponse<WorkflowView>>, ApiError> {
    let Query(query) = params?;
    let page = state
        .queries
        .list_workflows(&query.filters(), query.pagination())
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/workflows/stats",
    params(ListQuery),
    responses(
        (status = 200, description = "Counts per canonical status", body = StateCounts),
        (status = 400, description = "Malformed query", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn workflow_stats(
    State(state): State<AppState>,
    params: ListParams,
) -> Result<Json<StateCounts>, ApiError> {
    let Query(query) = params?;
    Ok(Json(state.queries.workflow_stats(&query.filters()).await?))
}

#[utoipa::path(
    get,
    path = "/workflows/{id}",
    params(("id" = i32, Path, description = "Workflow run id")),
    responses(
        (status = 200, description = "Workflow run", body = WorkflowView),
        (status = 404, description = "Workflow run not found", body = ApiError)
    ),
    tag = "workflows"
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<WorkflowView>, ApiError> {
    Ok(Json(state.queries.get_workflow(id).await?))
}
