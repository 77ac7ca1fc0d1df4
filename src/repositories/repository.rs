//! Repository store
//!
//! Source repositories registered against a provider, plus the per-resource
//! sync metadata the orchestrator maintains on them.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::info;

use crate::connectors::{ApiRegistry, RepositoryRecord};
use crate::error::{EngineError, EngineResult, conflict_or_db};
use crate::models::repository::{self, Column, Entity as Repository};
use crate::models::{issue, pull_request, workflow_run};
use crate::normalization::{ResourceKind, fold_case};
use crate::repositories::provider::{ProviderRepository, normalize_url};

pub const SYNC_STATUS_SUCCESS: &str = "success";
pub const SYNC_STATUS_FAILURE: &str = "failure";

/// The three metadata columns tracking one resource kind.
struct SyncColumns {
    synced_at: Column,
    status: Column,
    error: Column,
}

fn sync_columns(kind: ResourceKind) -> SyncColumns {
    match kind {
        ResourceKind::Issues => SyncColumns {
            synced_at: Column::LastIssuesSyncedAt,
            status: Column::LastIssuesSyncStatus,
            error: Column::LastIssuesSyncError,
        },
        ResourceKind::PullRequests => SyncColumns {
            synced_at: Column::LastPullRequestsSyncedAt,
            status: Column::LastPullRequestsSyncStatus,
            error: Column::LastPullRequestsSyncError,
        },
        ResourceKind::Workflows => SyncColumns {
            synced_at: Column::LastWorkflowsSyncedAt,
            status: Column::LastWorkflowsSyncStatus,
            error: Column::LastWorkflowsSyncError,
        },
    }
}

/// Time of the last successful sync of `kind`; the next fetch resumes from it.
pub fn last_synced_at(model: &repository::Model, kind: ResourceKind) -> Option<DateTime<Utc>> {
    let at = match kind {
        ResourceKind::Issues => model.last_issues_synced_at,
        ResourceKind::PullRequests => model.last_pull_requests_synced_at,
        ResourceKind::Workflows => model.last_workflows_synced_at,
    };
    at.map(|t| t.with_timezone(&Utc))
}

pub fn last_sync_status(model: &repository::Model, kind: ResourceKind) -> Option<&str> {
    match kind {
        ResourceKind::Issues => model.last_issues_sync_status.as_deref(),
        ResourceKind::PullRequests => model.last_pull_requests_sync_status.as_deref(),
        ResourceKind::Workflows => model.last_workflows_sync_status.as_deref(),
    }
}

pub fn last_sync_error(model: &repository::Model, kind: ResourceKind) -> Option<&str> {
    match kind {
        ResourceKind::Issues => model.last_issues_sync_error.as_deref(),
        ResourceKind::PullRequests => model.last_pull_requests_sync_error.as_deref(),
        ResourceKind::Workflows => model.last_workflows_sync_error.as_deref(),
    }
}

/// Records a successful sync of `kind`. Runs on the caller's connection so
/// it commits together with the upserted rows.
pub async fn mark_success<C: ConnectionTrait>(
    conn: &C,
    repository_id: i32,
    kind: ResourceKind,
    synced_at: DateTimeWithTimeZone,
) -> Result<(), DbErr> {
    let cols = sync_columns(kind);
    Repository::update_many()
        .col_expr(cols.synced_at, Expr::value(synced_at))
        .col_expr(cols.status, Expr::value(SYNC_STATUS_SUCCESS))
        .col_expr(cols.error, Expr::value(Option::<String>::None))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(Column::Id.eq(repository_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Records a failed sync of `kind`. The last success timestamp is kept.
pub async fn mark_failure<C: ConnectionTrait>(
    conn: &C,
    repository_id: i32,
    kind: ResourceKind,
    error: &str,
) -> Result<(), DbErr> {
    let cols = sync_columns(kind);
    Repository::update_many()
        .col_expr(cols.status, Expr::value(SYNC_STATUS_FAILURE))
        .col_expr(cols.error, Expr::value(error))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(Column::Id.eq(repository_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// A web URL split into its canonical form and namespaced path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub web_url: String,
    pub full_name: String,
}

/// Accepts `https://host/owner/repo`, with an optional trailing slash or
/// `.git` suffix, when it lives under `base_url`.
pub fn parse_repository_url(base_url: &str, raw: &str) -> EngineResult<RepositoryLocation> {
    let normalized = normalize_url("web_url", raw)?;
    let normalized = normalized.strip_suffix(".git").unwrap_or(&normalized);
    let base = base_url.trim_end_matches('/');

    let path = normalized
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| {
            EngineError::Validation(format!("repository URL must live under {base}"))
        })?;

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(EngineError::Validation(
            "repository URL must include an owner and a repository name".into(),
        ));
    }

    let full_name = segments.join("/");
    Ok(RepositoryLocation {
        web_url: format!("{base}/{full_name}"),
        full_name,
    })
}

#[derive(Clone)]
pub struct RepositoryStore {
    pub db: Arc<DatabaseConnection>,
    providers: ProviderRepository,
    apis: Arc<ApiRegistry>,
}

impl RepositoryStore {
    pub fn new(
        db: Arc<DatabaseConnection>,
        providers: ProviderRepository,
        apis: Arc<ApiRegistry>,
    ) -> Self {
        Self {
            db,
            providers,
            apis,
        }
    }

    /// Registers a repository by its web URL. Metadata comes from the
    /// provider API, so the provider needs a working token.
    pub async fn add(&self, provider_id: i32, web_url: &str) -> EngineResult<repository::Model> {
        let provider = self.providers.get(provider_id).await?;
        let location = parse_repository_url(&provider.base_url, web_url)?;

        if self.find_by_url(provider_id, &location.web_url).await?.is_some() {
            return Err(EngineError::Conflict(format!(
                "repository {} is already registered",
                location.web_url
            )));
        }

        let endpoint = self.providers.endpoint(&provider)?;
        let api = self
            .apis
            .get(endpoint.kind)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let record = api.fetch_repository(&endpoint, &location.full_name).await?;

        let model = self.insert(provider_id, &location, record).await?;
        info!(
            provider_id,
            repository_id = model.id,
            full_name = %model.full_name,
            "Repository registered"
        );
        Ok(model)
    }

    async fn insert(
        &self,
        provider_id: i32,
        location: &RepositoryLocation,
        record: RepositoryRecord,
    ) -> EngineResult<repository::Model> {
        let now = Utc::now().fixed_offset();
        let full_name = if record.full_name.is_empty() {
            location.full_name.clone()
        } else {
            record.full_name
        };
        repository::ActiveModel {
            provider_id: Set(provider_id),
            api_id: Set(record.api_id),
            name_folded: Set(fold_case(&record.name)),
            full_name_folded: Set(fold_case(&full_name)),
            name: Set(record.name),
            full_name: Set(full_name),
            web_url: Set(location.web_url.clone()),
            description: Set(record.description),
            is_private: Set(record.is_private),
            language: Set(record.language),
            last_activity_at: Set(record.last_activity_at.map(|t| t.fixed_offset())),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| conflict_or_db(e, "repository"))
    }

    async fn find_by_url(
        &self,
        provider_id: i32,
        web_url: &str,
    ) -> EngineResult<Option<repository::Model>> {
        Ok(Repository::find()
            .filter(Column::ProviderId.eq(provider_id))
            .filter(Column::WebUrl.eq(web_url))
            .one(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: i32) -> EngineResult<repository::Model> {
        Repository::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("repository", id))
    }

    /// Repositories ordered by id, optionally limited to one provider.
    pub async fn list(&self, provider_id: Option<i32>) -> EngineResult<Vec<repository::Model>> {
        let mut query = Repository::find();
        if let Some(provider_id) = provider_id {
            query = query.filter(Column::ProviderId.eq(provider_id));
        }
        Ok(query.order_by_asc(Column::Id).all(&*self.db).await?)
    }

    /// Deletes the repository together with its synced resources.
    pub async fn delete(&self, id: i32) -> EngineResult<()> {
        let existing = self.get(id).await?;

        let txn = self.db.begin().await?;
        issue::Entity::delete_many()
            .filter(issue::Column::RepositoryId.eq(id))
            .exec(&txn)
            .await?;
        pull_request::Entity::delete_many()
            .filter(pull_request::Column::RepositoryId.eq(id))
            .exec(&txn)
            .await?;
        workflow_run::Entity::delete_many()
            .filter(workflow_run::Column::RepositoryId.eq(id))
            .exec(&txn)
            .await?;
        Repository::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;

        info!(repository_id = id, "Repository deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_name_under_base_url() {
        let loc = parse_repository_url("https://github.com", "https://github.com/rust-lang/rust/")
            .unwrap();
        assert_eq!(loc.full_name, "rust-lang/rust");
        assert_eq!(loc.web_url, "https://github.com/rust-lang/rust");
    }

    #[test]
    fn strips_git_suffix_and_keeps_nested_groups() {
        let loc = parse_repository_url(
            "https://gitlab.example.com/",
            "https://gitlab.example.com/platform/infra/deploy.git",
        )
        .unwrap();
        assert_eq!(loc.full_name, "platform/infra/deploy");
        assert_eq!(loc.web_url, "https://gitlab.example.com/platform/infra/deploy");
    }

    #[test]
    fn rejects_urls_outside_the_provider() {
        let err = parse_repository_url("https://github.com", "https://gitlab.com/a/b").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn rejects_urls_without_repository_segment() {
        let err = parse_repository_url("https://github.com", "https://github.com/only-owner")
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
