//! # Error Handling
//!
//! [`EngineError`] is the failure taxonomy of the sync engine. Every provider
//! fetch failure maps to exactly one variant, and that variant's
//! [`EngineError::reason`] is what gets persisted on the repository row.
//! [`ApiError`] renders any of them as a problem+json response carrying the
//! request's trace id.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::crypto::CryptoError;
use crate::telemetry;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a sync run is already in progress")]
    AlreadyInProgress,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("provider request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short machine-readable reason, stored in `last_*_sync_error` prefixes
    /// and used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::AlreadyInProgress => "already_in_progress",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Unreachable(_) => "unreachable",
            EngineError::Timeout(_) => "timeout",
            EngineError::RateLimited { .. } => "rate_limited",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Malformed(_) => "malformed",
            EngineError::Validation(_) => "validation",
            EngineError::Conflict(_) => "conflict",
            EngineError::Crypto(_) => "crypto",
            EngineError::Database(_) => "database",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Human-readable summary safe to persist in history and repository rows.
    pub fn summary(&self) -> String {
        match self {
            EngineError::Database(_) => "database error".to_string(),
            EngineError::Crypto(_) => "stored token could not be decrypted".to_string(),
            other => other.to_string(),
        }
    }

    /// `reason: detail` line persisted on a repository after a failed fetch.
    pub fn failure_note(&self) -> String {
        let detail = match self {
            EngineError::Unauthorized(m)
            | EngineError::Forbidden(m)
            | EngineError::Unreachable(m)
            | EngineError::Timeout(m)
            | EngineError::Malformed(m)
            | EngineError::Validation(m)
            | EngineError::Conflict(m) => m.clone(),
            EngineError::RateLimited {
                message,
                retry_after_secs: Some(secs),
            } => format!("{message} (retry after {secs}s)"),
            EngineError::RateLimited { message, .. } => message.clone(),
            other => other.summary(),
        };
        format!("{}: {}", self.reason(), detail)
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            EngineError::AlreadyInProgress => (StatusCode::CONFLICT, "SYNC_IN_PROGRESS"),
            EngineError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            EngineError::Unreachable(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_UNREACHABLE"),
            EngineError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "PROVIDER_TIMEOUT"),
            EngineError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            EngineError::Malformed(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            EngineError::Crypto(_) | EngineError::Database(_) | EngineError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR")
            }
        }
    }
}

impl From<crate::normalization::NormalizationError> for EngineError {
    fn from(err: crate::normalization::NormalizationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

/// Maps a database error to [`EngineError::Conflict`] when it is a unique
/// constraint violation.
pub fn conflict_or_db(error: sea_orm::DbErr, what: &str) -> EngineError {
    if is_unique_violation(&error) {
        EngineError::Conflict(format!("{what} already exists"))
    } else {
        EngineError::Database(error)
    }
}

pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&&*code))
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace id of the current request, or a generated correlation id outside one.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .or_else(|| {
                let id = uuid::Uuid::new_v4().simple().to_string();
                Some(format!("corr-{}", &id[..8]))
            })
            .map(String::into_boxed_str)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let (status, code) = error.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %error, "request failed");
        }

        let api = ApiError::new(status, code, error.summary());
        match &error {
            EngineError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => api.with_retry_after(*secs),
            EngineError::NotFound { entity, id } => {
                api.with_details(serde_json::json!({ "entity": entity, "id": id }))
            }
            _ => api,
        }
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        EngineError::Database(error).into()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            format!("Invalid query string: {}", rejection.body_text()),
        )
    }
}
