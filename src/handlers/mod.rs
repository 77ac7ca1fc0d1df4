//! # API Handlers
//!
//! HTTP endpoint handlers, grouped by area.

use axum::{extract::State, http::StatusCode, response::Json};

use crate::db;
use crate::error::ApiError;
use crate::handlers::types::HealthResponse;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod providers;
pub mod repositories;
pub mod resources;
pub mod settings;
pub mod sync;
pub mod types;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Process is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe; pings the database
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "health"
)]
pub async fn readyz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Readiness check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "database is not reachable",
        )
    })?;
    Ok(Json(HealthResponse {
        status: "ready".to_string(),
    }))
}
