//! # Common API Types
//!
//! Request and response shapes shared by the handlers. Entity models never
//! leave the crate directly; each has a view that drops the sealed token and
//! flattens per-resource sync metadata.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::{provider, repository, sync_history};
use crate::normalization::ResourceKind;
use crate::query::{ListFilters, Pagination};
use crate::repositories::repository::{last_sync_error, last_sync_status, last_synced_at};
use crate::sync_orchestrator::SyncStatus;

/// Provider profile as exposed over the API. The token itself is never
/// returned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderView {
    pub id: i32,
    pub name: String,
    /// `github` or `gitlab`
    pub kind: String,
    pub base_url: String,
    pub api_base_url: String,
    /// Whether a sealed token is stored
    pub has_token: bool,
    /// Result of the last token validation
    pub token_valid: bool,
    pub token_validated_at: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl From<provider::Model> for ProviderView {
    fn from(model: provider::Model) -> Self {
        Self {
            id: model.id,
            has_token: model.token_ciphertext.is_some(),
            name: model.name,
            kind: model.kind,
            base_url: model.base_url,
            api_base_url: model.api_base_url,
            token_valid: model.token_valid,
            token_validated_at: model.token_validated_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProviderRequest {
    pub name: String,
    /// `github` or `gitlab`
    #[schema(example = "github")]
    pub kind: String,
    #[schema(example = "https://github.com")]
    pub base_url: String,
    #[schema(example = "https://api.github.com")]
    pub api_base_url: String,
    /// Personal access token; sealed before it is stored
    pub token: Option<String>,
}

/// Replaces the stored token. `null` clears it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateTokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenValidationResponse {
    pub provider_id: i32,
    pub token_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddRepositoryRequest {
    pub provider_id: i32,
    /// Canonical web URL, e.g. `https://github.com/rust-lang/rust`
    pub web_url: String,
}

/// Outcome of the last sync of one resource kind.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceSyncView {
    pub last_synced_at: Option<DateTime<Utc>>,
    /// `success`, `failure`, or `null` when never synced
    pub status: Option<String>,
    pub error: Option<String>,
}

impl ResourceSyncView {
    fn of(model: &repository::Model, kind: ResourceKind) -> Self {
        Self {
            last_synced_at: last_synced_at(model, kind),
            status: last_sync_status(model, kind).map(str::to_owned),
            error: last_sync_error(model, kind).map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepositoryView {
    pub id: i32,
    pub provider_id: i32,
    pub api_id: String,
    pub name: String,
    pub full_name: String,
    pub web_url: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub language: Option<String>,
    pub last_activity_at: Option<DateTime<FixedOffset>>,
    pub issues: ResourceSyncView,
    pub pull_requests: ResourceSyncView,
    pub workflows: ResourceSyncView,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

impl From<repository::Model> for RepositoryView {
    fn from(model: repository::Model) -> Self {
        let issues = ResourceSyncView::of(&model, ResourceKind::Issues);
        let pull_requests = ResourceSyncView::of(&model, ResourceKind::PullRequests);
        let workflows = ResourceSyncView::of(&model, ResourceKind::Workflows);
        Self {
            id: model.id,
            provider_id: model.provider_id,
            api_id: model.api_id,
            name: model.name,
            full_name: model.full_name,
            web_url: model.web_url,
            description: model.description,
            is_private: model.is_private,
            language: model.language,
            last_activity_at: model.last_activity_at,
            issues,
            pull_requests,
            workflows,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct RepositoryListQuery {
    /// Only repositories of this provider
    pub provider_id: Option<i32>,
}

/// Filters and paging for resource lists.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Canonical state, or `all`
    pub state: Option<String>,
    /// Only items assigned to the configured operator
    pub assigned_to_me: Option<bool>,
    /// Author login (case-insensitive)
    pub author: Option<String>,
    /// Provider name (case-insensitive)
    pub provider: Option<String>,
    /// Repository `name` or `owner/name` (case-insensitive)
    pub repository: Option<String>,
    /// Substring of the title or author
    pub search: Option<String>,
    /// 1-based page number (default 1)
    pub page: Option<u64>,
    /// Page size (default 10, max 100)
    pub per_page: Option<u64>,
}

impl ListQuery {
    pub fn filters(&self) -> ListFilters {
        ListFilters {
            state: self.state.clone(),
            assigned_to_me: self.assigned_to_me.unwrap_or(false),
            author: self.author.clone(),
            provider: self.provider.clone(),
            repository: self.repository.clone(),
            search: self.search.clone(),
        }
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.per_page)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Maximum entries to return (default 50, max 500)
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncHistoryView {
    pub id: i32,
    /// `all_providers`, `provider` or `repository`
    pub scope: String,
    pub target_id: Option<i32>,
    pub target_name: Option<String>,
    /// `started`, `completed` or `failed`
    pub status: String,
    pub error_message: Option<String>,
    pub items_synced: i32,
    pub repositories_synced: i32,
    pub errors_count: i32,
    pub started_at: DateTime<FixedOffset>,
    pub completed_at: Option<DateTime<FixedOffset>>,
    pub duration_ms: Option<i64>,
}

impl From<sync_history::Model> for SyncHistoryView {
    fn from(model: sync_history::Model) -> Self {
        Self {
            id: model.id,
            scope: model.scope,
            target_id: model.target_id,
            target_name: model.target_name,
            status: model.status,
            error_message: model.error_message,
            items_synced: model.items_synced,
            repositories_synced: model.repositories_synced,
            errors_count: model.errors_count,
            started_at: model.started_at,
            completed_at: model.completed_at,
            duration_ms: model.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusResponse {
    pub in_progress: bool,
    /// Scope of the running sync
    pub scope: Option<String>,
    pub target_id: Option<i32>,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl From<SyncStatus> for SyncStatusResponse {
    fn from(status: SyncStatus) -> Self {
        let holder = status.holder;
        Self {
            in_progress: status.in_progress,
            scope: holder.as_ref().map(|h| h.target.scope().to_string()),
            target_id: holder.as_ref().and_then(|h| h.target.target_id()),
            acquired_at: holder.map(|h| h.acquired_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LockReleaseResponse {
    /// Whether a lock was held and has been cleared
    pub released: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_to_first_page_of_ten() {
        let query = ListQuery::default();
        assert_eq!(query.pagination(), Pagination::new(Some(1), Some(10)));
        assert!(!query.filters().assigned_to_me);
    }

    #[test]
    fn list_query_parses_from_query_string() {
        let uri: axum::http::Uri =
            "/issues?state=open&assigned_to_me=true&search=crash&page=3&per_page=25"
                .parse()
                .unwrap();
        let axum::extract::Query(query) =
            axum::extract::Query::<ListQuery>::try_from_uri(&uri).unwrap();
        let filters = query.filters();
        assert_eq!(filters.state.as_deref(), Some("open"));
        assert!(filters.assigned_to_me);
        assert_eq!(filters.search.as_deref(), Some("crash"));
        assert_eq!(query.pagination(), Pagination::new(Some(3), Some(25)));
    }
}
