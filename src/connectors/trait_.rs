//! Provider API trait definition
//!
//! The sync engine talks to GitHub-like and GitLab-like services only through
//! [`ProviderApi`]. Implementations hide auth headers, pagination and
//! rate-limit signalling; callers see a page of records or a typed
//! [`FetchError`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::SecretToken;
use crate::error::EngineError;
use crate::normalization::ProviderKind;

/// Typed failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchError {
    #[serde(flatten)]
    pub kind: FetchErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    Unreachable,
    Timeout,
    Malformed,
}

impl FetchError {
    fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn rate_limited(retry_after_secs: Option<u64>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited { retry_after_secs }, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Malformed, message)
    }

    /// True for failures caused by the credential rather than the network.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Unauthorized | FetchErrorKind::Forbidden
        )
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FetchErrorKind::RateLimited {
                retry_after_secs: Some(after),
            } => write!(f, "rate limited (retry after {}s): {}", after, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<FetchError> for EngineError {
    fn from(err: FetchError) -> Self {
        let message = err.message;
        match err.kind {
            FetchErrorKind::Unauthorized => EngineError::Unauthorized(message),
            FetchErrorKind::Forbidden => EngineError::Forbidden(message),
            FetchErrorKind::NotFound => EngineError::NotFound {
                entity: "remote resource",
                id: message,
            },
            FetchErrorKind::RateLimited { retry_after_secs } => EngineError::RateLimited {
                message,
                retry_after_secs,
            },
            FetchErrorKind::Unreachable => EngineError::Unreachable(message),
            FetchErrorKind::Timeout => EngineError::Timeout(message),
            FetchErrorKind::Malformed => EngineError::Malformed(message),
        }
    }
}

/// Where and how to reach one provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub kind: ProviderKind,
    pub api_base_url: String,
    pub token: SecretToken,
}

/// Identifies a repository in provider API calls.
#[derive(Debug, Clone)]
pub struct RepositoryRef {
    pub api_id: String,
    pub full_name: String,
}

/// One page request; `page` is 1-based.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
    /// Only records updated after this instant are wanted.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryRecord {
    pub api_id: String,
    pub name: String,
    pub full_name: String,
    pub web_url: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub language: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueRecord {
    pub api_id: String,
    pub number: i64,
    pub title: String,
    pub author: String,
    pub native_state: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub url: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRecord {
    pub api_id: String,
    pub number: i64,
    pub title: String,
    pub author: String,
    pub native_state: String,
    pub draft: bool,
    pub assignees: Vec<String>,
    pub url: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRunRecord {
    pub api_id: String,
    pub name: String,
    pub native_status: String,
    pub conclusion: Option<String>,
    pub author: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client for one provider family.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Cheap authenticated probe of the endpoint's token.
    async fn validate_token(&self, endpoint: &ProviderEndpoint) -> Result<(), FetchError>;

    /// Look up repository metadata by its namespaced path.
    async fn fetch_repository(
        &self,
        endpoint: &ProviderEndpoint,
        full_name: &str,
    ) -> Result<RepositoryRecord, FetchError>;

    async fn fetch_issues(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<IssueRecord>, FetchError>;

    async fn fetch_pull_requests(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<PullRequestRecord>, FetchError>;

    async fn fetch_workflow_runs(
        &self,
        endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<WorkflowRunRecord>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_serializes_with_type_tag() {
        let err = FetchError::rate_limited(Some(30), "secondary rate limit");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["type"], "rate_limited");
        assert_eq!(value["retry_after_secs"], 30);
        assert_eq!(value["message"], "secondary rate limit");
    }

    #[test]
    fn fetch_errors_map_onto_engine_taxonomy() {
        let cases = [
            (FetchError::unauthorized("x"), "unauthorized"),
            (FetchError::forbidden("x"), "forbidden"),
            (FetchError::not_found("x"), "not_found"),
            (FetchError::rate_limited(None, "x"), "rate_limited"),
            (FetchError::unreachable("x"), "unreachable"),
            (FetchError::timeout("x"), "timeout"),
            (FetchError::malformed("x"), "malformed"),
        ];
        for (fetch, reason) in cases {
            assert_eq!(EngineError::from(fetch).reason(), reason);
        }
    }

    #[test]
    fn only_credential_failures_are_auth_failures() {
        assert!(FetchError::unauthorized("x").is_auth_failure());
        assert!(FetchError::forbidden("x").is_auth_failure());
        assert!(!FetchError::timeout("x").is_auth_failure());
    }
}
