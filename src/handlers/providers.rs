//! # Providers API Handlers
//!
//! Provider profile management and token validation.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};

use crate::crypto::SecretToken;
use crate::error::{ApiError, EngineError};
use crate::handlers::types::{
    CreateProviderRequest, ProviderView, TokenValidationResponse, UpdateTokenRequest,
};
use crate::normalization::ProviderKind;
use crate::repositories::NewProvider;
use crate::server::AppState;

fn token_from(raw: Option<String>) -> Option<SecretToken> {
    raw.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(SecretToken::new)
}

/// List configured providers
#[utoipa::path(
    get,
    path = "/providers",
    responses(
        (status = 200, description = "Configured providers ordered by id", body = Vec<ProviderView>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProviderView>>, ApiError> {
    let providers = state.vault.providers().list().await?;
    Ok(Json(providers.into_iter().map(ProviderView::from).collect()))
}

/// Register a provider
#[utoipa::path(
    post,
    path = "/providers",
    request_body = CreateProviderRequest,
    responses(
        (status = 201, description = "Provider registered", body = ProviderView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Provider name already taken", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn create_provider(
    State(state): State<AppState>,
    payload: Result<Json<CreateProviderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProviderView>), ApiError> {
    let Json(request) = payload?;
    let kind: ProviderKind = request.kind.parse().map_err(EngineError::from)?;

    let model = state
        .vault
        .providers()
        .register(NewProvider {
            name: request.name,
            kind,
            base_url: request.base_url,
            api_base_url: request.api_base_url,
            token: token_from(request.token),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(model.into())))
}

/// Get a provider by id
#[utoipa::path(
    get,
    path = "/providers/{id}",
    params(("id" = i32, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Provider", body = ProviderView),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProviderView>, ApiError> {
    let model = state.vault.providers().get(id).await?;
    Ok(Json(model.into()))
}

/// Delete a provider together with its repositories and their resources
#[utoipa::path(
    delete,
    path = "/providers/{id}",
    params(("id" = i32, Path, description = "Provider id")),
    responses(
        (status = 204, description = "Provider deleted"),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn delete_provider(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state.vault.providers().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace or clear the provider token
///
/// Resets `token_valid` to false until the next validation.
#[utoipa::path(
    put,
    path = "/providers/{id}/token",
    params(("id" = i32, Path, description = "Provider id")),
    request_body = UpdateTokenRequest,
    responses(
        (status = 200, description = "Token updated", body = ProviderView),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn update_token(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Result<Json<UpdateTokenRequest>, JsonRejection>,
) -> Result<Json<ProviderView>, ApiError> {
    let Json(request) = payload?;
    let model = state
        .vault
        .providers()
        .update_token(id, token_from(request.token))
        .await?;
    Ok(Json(model.into()))
}

/// Probe the provider API with the stored token
///
/// Any rejection or transport failure reports `token_valid: false`.
#[utoipa::path(
    post,
    path = "/providers/{id}/validate",
    params(("id" = i32, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Validation outcome", body = TokenValidationResponse),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn validate_token(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<TokenValidationResponse>, ApiError> {
    let token_valid = state.vault.check_token(id).await?;
    Ok(Json(TokenValidationResponse {
        provider_id: id,
        token_valid,
    }))
}
