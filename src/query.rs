//! Query engine
//!
//! Filtered, page-numbered reads over issues, pull requests and workflow
//! runs. Reads never take the sync lock; rows are ordered by provider-side
//! creation time (newest first) with the row id as tie-breaker, so pages are
//! stable while the store is not being written.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use sea_orm::sea_query::{Expr, LikeExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Related, RelationTrait, Select,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{EngineError, EngineResult};
use crate::models::{issue, provider, pull_request, repository, workflow_run};
use crate::normalization::{
    IssueState, PullRequestState, WorkflowState, fold_case, parse_state_filter,
};
use crate::repositories::resources::decode_assignees;

pub const DEFAULT_PER_PAGE: u64 = 10;
pub const MAX_PER_PAGE: u64 = 100;

/// Filters shared by every resource list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilters {
    /// Canonical state, or `all`
    pub state: Option<String>,
    /// Only items assigned to (or, for workflows, triggered by) the operator
    #[serde(default)]
    pub assigned_to_me: bool,
    /// Exact author login, case-insensitive
    pub author: Option<String>,
    /// Provider display name, case-insensitive
    pub provider: Option<String>,
    /// Repository name or `owner/name`, case-insensitive
    pub repository: Option<String>,
    /// Substring of title/name or author, case-insensitive
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    /// `page` is clamped to at least 1, `per_page` to at most [`MAX_PER_PAGE`].
    pub fn new(page: Option<u64>, per_page: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// Page of results plus totals computed over the whole filtered set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Row counts per canonical state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StateCounts {
    pub total: u64,
    pub by_state: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueView {
    pub id: i32,
    pub repository_id: i32,
    pub repository_name: String,
    pub provider_id: i32,
    pub provider_name: String,
    pub number: i64,
    pub title: String,
    pub author: String,
    pub state: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub assigned_to_me: bool,
    pub url: String,
    pub closed_at: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PullRequestView {
    pub id: i32,
    pub repository_id: i32,
    pub repository_name: String,
    pub provider_id: i32,
    pub provider_name: String,
    pub number: i64,
    pub title: String,
    pub author: String,
    pub state: String,
    pub draft: bool,
    pub assignees: Vec<String>,
    pub assigned_to_me: bool,
    pub url: String,
    pub merged_at: Option<DateTime<FixedOffset>>,
    pub closed_at: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowView {
    pub id: i32,
    pub repository_id: i32,
    pub repository_name: String,
    pub provider_id: i32,
    pub provider_name: String,
    pub name: String,
    /// Canonical state
    pub status: String,
    pub native_status: String,
    pub conclusion: Option<String>,
    pub author: Option<String>,
    pub assigned_to_me: bool,
    pub url: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
}

/// Column layout shared by the three resource tables.
pub trait ResourceEntity: EntityTrait + Related<repository::Entity> {
    const RESOURCE: &'static str;

    fn id_column() -> Self::Column;
    fn state_column() -> Self::Column;
    /// Lower-cased title (workflow name) column.
    fn folded_title_column() -> Self::Column;
    /// Lower-cased author column.
    fn folded_author_column() -> Self::Column;
    /// `None` when "assigned to me" means "authored by me".
    fn assignees_column() -> Option<Self::Column>;
    fn created_column() -> Self::Column;
    fn repository_id(model: &Self::Model) -> i32;

    /// Validates a state filter against the canonical vocabulary.
    fn parse_state(raw: Option<&str>) -> EngineResult<Option<&'static str>>;
}

impl ResourceEntity for issue::Entity {
    const RESOURCE: &'static str = "issue";

    fn id_column() -> issue::Column {
        issue::Column::Id
    }
    fn state_column() -> issue::Column {
        issue::Column::State
    }
    fn folded_title_column() -> issue::Column {
        issue::Column::TitleFolded
    }
    fn folded_author_column() -> issue::Column {
        issue::Column::AuthorFolded
    }
    fn assignees_column() -> Option<issue::Column> {
        Some(issue::Column::Assignees)
    }
    fn created_column() -> issue::Column {
        issue::Column::ApiCreatedAt
    }
    fn repository_id(model: &issue::Model) -> i32 {
        model.repository_id
    }
    fn parse_state(raw: Option<&str>) -> EngineResult<Option<&'static str>> {
        Ok(
            parse_state_filter(Self::RESOURCE, raw, &IssueState::ALL, IssueState::as_str)?
                .map(IssueState::as_str),
        )
    }
}

impl ResourceEntity for pull_request::Entity {
    const RESOURCE: &'static str = "pull request";

    fn id_column() -> pull_request::Column {
        pull_request::Column::Id
    }
    fn state_column() -> pull_request::Column {
        pull_request::Column::State
    }
    fn folded_title_column() -> pull_request::Column {
        pull_request::Column::TitleFolded
    }
    fn folded_author_column() -> pull_request::Column {
        pull_request::Column::AuthorFolded
    }
    fn assignees_column() -> Option<pull_request::Column> {
        Some(pull_request::Column::Assignees)
    }
    fn created_column() -> pull_request::Column {
        pull_request::Column::ApiCreatedAt
    }
    fn repository_id(model: &pull_request::Model) -> i32 {
        model.repository_id
    }
    fn parse_state(raw: Option<&str>) -> EngineResult<Option<&'static str>> {
        Ok(parse_state_filter(
            Self::RESOURCE,
            raw,
            &PullRequestState::ALL,
            PullRequestState::as_str,
        )?
        .map(PullRequestState::as_str))
    }
}

impl ResourceEntity for workflow_run::Entity {
    const RESOURCE: &'static str = "workflow";

    fn id_column() -> workflow_run::Column {
        workflow_run::Column::Id
    }
    fn state_column() -> workflow_run::Column {
        workflow_run::Column::Status
    }
    fn folded_title_column() -> workflow_run::Column {
        workflow_run::Column::NameFolded
    }
    fn folded_author_column() -> workflow_run::Column {
        workflow_run::Column::AuthorFolded
    }
    fn assignees_column() -> Option<workflow_run::Column> {
        None
    }
    fn created_column() -> workflow_run::Column {
        workflow_run::Column::ApiCreatedAt
    }
    fn repository_id(model: &workflow_run::Model) -> i32 {
        model.repository_id
    }
    fn parse_state(raw: Option<&str>) -> EngineResult<Option<&'static str>> {
        Ok(parse_state_filter(
            Self::RESOURCE,
            raw,
            &WorkflowState::ALL,
            WorkflowState::as_str,
        )?
        .map(WorkflowState::as_str))
    }
}

fn col<E: EntityTrait>(column: E::Column) -> Expr {
    Expr::col((E::default(), column))
}

/// Escapes LIKE wildcards; pair with `ESCAPE '\'`.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn contains(value: &str) -> LikeExpr {
    LikeExpr::new(format!("%{}%", escape_like(value))).escape('\\')
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|v| fold_case(v.trim()))
        .filter(|v| !v.is_empty())
}

/// Name and provider of a repository, for list views.
#[derive(Debug, Clone)]
struct RepositoryLabel {
    repository_name: String,
    provider_id: i32,
    provider_name: String,
}

#[derive(Debug, Clone)]
pub struct QueryEngine {
    db: Arc<DatabaseConnection>,
    operator_login: Option<String>,
}

impl QueryEngine {
    pub fn new(db: Arc<DatabaseConnection>, operator_login: Option<String>) -> Self {
        let operator_login = operator_login
            .map(|l| fold_case(l.trim()))
            .filter(|l| !l.is_empty());
        Self { db, operator_login }
    }

    pub fn operator_login(&self) -> Option<&str> {
        self.operator_login.as_deref()
    }

    /// Joined query with every filter except `state` applied.
    fn base_query<E: ResourceEntity>(&self, filters: &ListFilters) -> Select<E> {
        let mut condition = Condition::all();

        if filters.assigned_to_me {
            condition = match (&self.operator_login, E::assignees_column()) {
                (Some(login), Some(column)) => condition.add(
                    Expr::col((E::default(), column))
                        .like(contains(&format!("|{login}|"))),
                ),
                (Some(login), None) => {
                    condition.add(col::<E>(E::folded_author_column()).eq(login.as_str()))
                }
                // Without an operator identity nothing is assigned to anyone.
                (None, _) => condition.add(Expr::col((E::default(), E::id_column())).is_null()),
            };
        }
        if let Some(author) = non_empty(&filters.author) {
            condition = condition.add(col::<E>(E::folded_author_column()).eq(author));
        }
        if let Some(name) = non_empty(&filters.provider) {
            condition =
                condition.add(col::<provider::Entity>(provider::Column::NameFolded).eq(name));
        }
        if let Some(name) = non_empty(&filters.repository) {
            condition = condition.add(
                Condition::any()
                    .add(
                        col::<repository::Entity>(repository::Column::NameFolded)
                            .eq(name.as_str()),
                    )
                    .add(
                        col::<repository::Entity>(repository::Column::FullNameFolded)
                            .eq(name.as_str()),
                    ),
            );
        }
        if let Some(term) = non_empty(&filters.search) {
            condition = condition.add(
                Condition::any()
                    .add(col::<E>(E::folded_title_column()).like(contains(&term)))
                    .add(col::<E>(E::folded_author_column()).like(contains(&term))),
            );
        }

        E::find()
            .join(JoinType::InnerJoin, <E as Related<repository::Entity>>::to())
            .join(JoinType::InnerJoin, repository::Relation::Provider.def())
            .filter(condition)
    }

    fn filtered<E: ResourceEntity>(&self, filters: &ListFilters) -> EngineResult<Select<E>> {
        let state = E::parse_state(filters.state.as_deref())?;
        let mut query = self.base_query::<E>(filters);
        if let Some(state) = state {
            query = query.filter(E::state_column().eq(state));
        }
        Ok(query)
    }

    async fn page<E: ResourceEntity>(
        &self,
        filters: &ListFilters,
        pagination: Pagination,
    ) -> EngineResult<(Vec<E::Model>, PaginationMeta)>
    where
        E::Model: Send + Sync,
    {
        let query = self.filtered::<E>(filters)?;
        let total = query.clone().count(&*self.db).await?;
        let per_page = pagination.per_page;
        let total_pages = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };

        // An offset that overflows is past the end of any table.
        let offset = (pagination.page - 1)
            .checked_mul(per_page)
            .filter(|offset| *offset < total);
        let rows = match offset {
            Some(offset) if per_page > 0 => {
                query
                    .order_by_desc(E::created_column())
                    .order_by_desc(E::id_column())
                    .offset(offset)
                    .limit(per_page)
                    .all(&*self.db)
                    .await?
            }
            _ => Vec::new(),
        };

        Ok((
            rows,
            PaginationMeta {
                page: pagination.page,
                per_page,
                total,
                total_pages,
            },
        ))
    }

    async fn stats<E: ResourceEntity>(
        &self,
        filters: &ListFilters,
        states: &[&'static str],
    ) -> EngineResult<StateCounts> {
        // Validate the state even though counts span all states.
        E::parse_state(filters.state.as_deref())?;

        let rows: Vec<(String, i64)> = self
            .base_query::<E>(filters)
            .select_only()
            .column(E::state_column())
            .column_as(Expr::col((E::default(), E::id_column())).count(), "count")
            .group_by(E::state_column())
            .into_tuple()
            .all(&*self.db)
            .await?;

        let mut counts = StateCounts {
            total: 0,
            by_state: states.iter().map(|s| (s.to_string(), 0)).collect(),
        };
        for (state, count) in rows {
            let count = count.max(0) as u64;
            counts.total += count;
            *counts.by_state.entry(state).or_insert(0) += count;
        }
        Ok(counts)
    }

    async fn labels(&self, repository_ids: Vec<i32>) -> EngineResult<HashMap<i32, RepositoryLabel>> {
        if repository_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = repository::Entity::find()
            .filter(repository::Column::Id.is_in(repository_ids))
            .find_also_related(provider::Entity)
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(repo, provider)| {
                let (provider_id, provider_name) = provider
                    .map(|p| (p.id, p.name))
                    .unwrap_or((repo.provider_id, String::new()));
                (
                    repo.id,
                    RepositoryLabel {
                        repository_name: repo.full_name,
                        provider_id,
                        provider_name,
                    },
                )
            })
            .collect())
    }

    async fn labels_for<E: ResourceEntity>(
        &self,
        rows: &[E::Model],
    ) -> EngineResult<HashMap<i32, RepositoryLabel>> {
        let mut ids: Vec<i32> = rows.iter().map(E::repository_id).collect();
        ids.sort_unstable();
        ids.dedup();
        self.labels(ids).await
    }

    fn is_assigned(&self, assignees: &str) -> bool {
        self.operator_login
            .as_deref()
            .is_some_and(|login| assignees.contains(&format!("|{login}|")))
    }

    fn is_operator(&self, author: Option<&str>) -> bool {
        match (self.operator_login.as_deref(), author) {
            (Some(login), Some(author)) => author.eq_ignore_ascii_case(login),
            _ => false,
        }
    }

    fn issue_view(&self, model: issue::Model, label: Option<&RepositoryLabel>) -> IssueView {
        let label = label.cloned().unwrap_or_else(|| missing_label(model.repository_id));
        let labels = serde_json::from_value(model.labels).unwrap_or_default();
        IssueView {
            id: model.id,
            repository_id: model.repository_id,
            repository_name: label.repository_name,
            provider_id: label.provider_id,
            provider_name: label.provider_name,
            number: model.number,
            title: model.title,
            author: model.author,
            state: model.state,
            labels,
            assigned_to_me: self.is_assigned(&model.assignees),
            assignees: decode_assignees(&model.assignees),
            url: model.url,
            closed_at: model.closed_at,
            created_at: model.api_created_at,
            updated_at: model.api_updated_at,
        }
    }

    fn pull_request_view(
        &self,
        model: pull_request::Model,
        label: Option<&RepositoryLabel>,
    ) -> PullRequestView {
        let label = label.cloned().unwrap_or_else(|| missing_label(model.repository_id));
        PullRequestView {
            id: model.id,
            repository_id: model.repository_id,
            repository_name: label.repository_name,
            provider_id: label.provider_id,
            provider_name: label.provider_name,
            number: model.number,
            title: model.title,
            author: model.author,
            state: model.state,
            draft: model.draft,
            assigned_to_me: self.is_assigned(&model.assignees),
            assignees: decode_assignees(&model.assignees),
            url: model.url,
            merged_at: model.merged_at,
            closed_at: model.closed_at,
            created_at: model.api_created_at,
            updated_at: model.api_updated_at,
        }
    }

    fn workflow_view(
        &self,
        model: workflow_run::Model,
        label: Option<&RepositoryLabel>,
    ) -> WorkflowView {
        let label = label.cloned().unwrap_or_else(|| missing_label(model.repository_id));
        WorkflowView {
            id: model.id,
            repository_id: model.repository_id,
            repository_name: label.repository_name,
            provider_id: label.provider_id,
            provider_name: label.provider_name,
            name: model.name,
            status: model.status,
            native_status: model.native_status,
            conclusion: model.conclusion,
            assigned_to_me: self.is_operator(model.author.as_deref()),
            author: model.author,
            url: model.url,
            created_at: model.api_created_at,
            updated_at: model.api_updated_at,
        }
    }

    pub async fn list_issues(
        &self,
        filters: &ListFilters,
        pagination: Pagination,
    ) -> EngineResult<PaginatedResponse<IssueView>> {
        let (rows, meta) = self.page::<issue::Entity>(filters, pagination).await?;
        let labels = self.labels_for::<issue::Entity>(&rows).await?;
        let data = rows
            .into_iter()
            .map(|row| {
                let label = labels.get(&row.repository_id);
                self.issue_view(row, label)
            })
            .collect();
        Ok(PaginatedResponse {
            data,
            pagination: meta,
        })
    }

    pub async fn list_pull_requests(
        &self,
        filters: &ListFilters,
        pagination: Pagination,
    ) -> EngineResult<PaginatedResponse<PullRequestView>> {
        let (rows, meta) = self
            .page::<pull_request::Entity>(filters, pagination)
            .await?;
        let labels = self.labels_for::<pull_request::Entity>(&rows).await?;
        let data = rows
            .into_iter()
            .map(|row| {
                let label = labels.get(&row.repository_id);
                self.pull_request_view(row, label)
            })
            .collect();
        Ok(PaginatedResponse {
            data,
            pagination: meta,
        })
    }

    pub async fn list_workflows(
        &self,
        filters: &ListFilters,
        pagination: Pagination,
    ) -> EngineResult<PaginatedResponse<WorkflowView>> {
        let (rows, meta) = self
            .page::<workflow_run::Entity>(filters, pagination)
            .await?;
        let labels = self.labels_for::<workflow_run::Entity>(&rows).await?;
        let data = rows
            .into_iter()
            .map(|row| {
                let label = labels.get(&row.repository_id);
                self.workflow_view(row, label)
            })
            .collect();
        Ok(PaginatedResponse {
            data,
            pagination: meta,
        })
    }

    pub async fn issue_stats(&self, filters: &ListFilters) -> EngineResult<StateCounts> {
        let states: Vec<&'static str> = IssueState::ALL.iter().map(|s| s.as_str()).collect();
        self.stats::<issue::Entity>(filters, &states).await
    }

    pub async fn pull_request_stats(&self, filters: &ListFilters) -> EngineResult<StateCounts> {
        let states: Vec<&'static str> = PullRequestState::ALL.iter().map(|s| s.as_str()).collect();
        self.stats::<pull_request::Entity>(filters, &states).await
    }

    pub async fn workflow_stats(&self, filters: &ListFilters) -> EngineResult<StateCounts> {
        let states: Vec<&'static str> = WorkflowState::ALL.iter().map(|s| s.as_str()).collect();
        self.stats::<workflow_run::Entity>(filters, &states).await
    }

    pub async fn get_issue(&self, id: i32) -> EngineResult<IssueView> {
        let model = issue::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("issue", id))?;
        let labels = self.labels(vec![model.repository_id]).await?;
        let label = labels.get(&model.repository_id).cloned();
        Ok(self.issue_view(model, label.as_ref()))
    }

    pub async fn get_pull_request(&self, id: i32) -> EngineResult<PullRequestView> {
        let model = pull_request::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("pull request", id))?;
        let labels = self.labels(vec![model.repository_id]).await?;
        let label = labels.get(&model.repository_id).cloned();
        Ok(self.pull_request_view(model, label.as_ref()))
    }

    pub async fn get_workflow(&self, id: i32) -> EngineResult<WorkflowView> {
        let model = workflow_run::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("workflow run", id))?;
        let labels = self.labels(vec![model.repository_id]).await?;
        let label = labels.get(&model.repository_id).cloned();
        Ok(self.workflow_view(model, label.as_ref()))
    }
}

fn missing_label(repository_id: i32) -> RepositoryLabel {
    RepositoryLabel {
        repository_name: format!("#{repository_id}"),
        provider_id: 0,
        provider_name: String::new(),
    }
}
