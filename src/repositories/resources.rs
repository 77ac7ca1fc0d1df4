//! Resource store upserts
//!
//! Issues, pull requests and workflow runs are written only here, keyed by
//! `(repository_id, api_id)`. Native states are normalized on the way in so
//! readers only ever see canonical values.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Set};

use crate::connectors::{IssueRecord, PullRequestRecord, WorkflowRunRecord};
use crate::models::{issue, pull_request, workflow_run};
use crate::normalization::{Dialect, fold_case};

/// Rows per INSERT statement, keeping bind parameters well under SQLite's limit.
const UPSERT_CHUNK: usize = 50;

/// Encodes logins as `|a|b|` (lower-cased) so a single LIKE finds a member.
pub fn encode_assignees(logins: &[String]) -> String {
    let mut logins: Vec<String> = logins
        .iter()
        .map(|l| fold_case(l.trim()))
        .filter(|l| !l.is_empty())
        .collect();
    if logins.is_empty() {
        return String::new();
    }
    logins.sort();
    logins.dedup();
    format!("|{}|", logins.join("|"))
}

pub fn decode_assignees(encoded: &str) -> Vec<String> {
    encoded
        .split('|')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keeps only the last record for each `api_id`, in order, so a page-shift
/// duplicate never lands twice in one `ON CONFLICT` statement.
fn last_per_api_id<T>(records: &[T], api_id: impl Fn(&T) -> &str) -> Vec<&T> {
    let last: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (api_id(r), i))
        .collect();
    records
        .iter()
        .enumerate()
        .filter(|(i, r)| last.get(api_id(*r)) == Some(i))
        .map(|(_, r)| r)
        .collect()
}

/// Upserts a page of issues and returns how many records were written.
pub async fn upsert_issues<C: ConnectionTrait>(
    conn: &C,
    repository_id: i32,
    dialect: &Dialect,
    records: &[IssueRecord],
) -> Result<u64, DbErr> {
    let records = last_per_api_id(records, |r| r.api_id.as_str());
    let now = Utc::now().fixed_offset();
    let rows: Vec<issue::ActiveModel> = records
        .iter()
        .map(|r| issue::ActiveModel {
            repository_id: Set(repository_id),
            api_id: Set(r.api_id.clone()),
            number: Set(r.number),
            title: Set(r.title.clone()),
            author: Set(r.author.clone()),
            title_folded: Set(fold_case(&r.title)),
            author_folded: Set(fold_case(&r.author)),
            state: Set(dialect.issue_state(&r.native_state).as_str().to_string()),
            labels: Set(serde_json::json!(r.labels)),
            assignees: Set(encode_assignees(&r.assignees)),
            url: Set(r.url.clone()),
            closed_at: Set(r.closed_at.map(|t| t.fixed_offset())),
            api_created_at: Set(r.created_at.fixed_offset()),
            api_updated_at: Set(r.updated_at.fixed_offset()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .collect();

    let on_conflict = OnConflict::columns([issue::Column::RepositoryId, issue::Column::ApiId])
        .update_columns([
            issue::Column::Number,
            issue::Column::Title,
            issue::Column::Author,
            issue::Column::TitleFolded,
            issue::Column::AuthorFolded,
            issue::Column::State,
            issue::Column::Labels,
            issue::Column::Assignees,
            issue::Column::Url,
            issue::Column::ClosedAt,
            issue::Column::ApiCreatedAt,
            issue::Column::ApiUpdatedAt,
            issue::Column::UpdatedAt,
        ])
        .to_owned();

    for chunk in rows.chunks(UPSERT_CHUNK) {
        issue::Entity::insert_many(chunk.to_vec())
            .on_conflict(on_conflict.clone())
            .exec_without_returning(conn)
            .await?;
    }
    Ok(records.len() as u64)
}

pub async fn upsert_pull_requests<C: ConnectionTrait>(
    conn: &C,
    repository_id: i32,
    dialect: &Dialect,
    records: &[PullRequestRecord],
) -> Result<u64, DbErr> {
    let records = last_per_api_id(records, |r| r.api_id.as_str());
    let now = Utc::now().fixed_offset();
    let rows: Vec<pull_request::ActiveModel> = records
        .iter()
        .map(|r| {
            let state = dialect.pull_request_state(&r.native_state, r.merged_at.is_some());
            pull_request::ActiveModel {
                repository_id: Set(repository_id),
                api_id: Set(r.api_id.clone()),
                number: Set(r.number),
                title: Set(r.title.clone()),
                author: Set(r.author.clone()),
                title_folded: Set(fold_case(&r.title)),
                author_folded: Set(fold_case(&r.author)),
                state: Set(state.as_str().to_string()),
                draft: Set(r.draft),
                assignees: Set(encode_assignees(&r.assignees)),
                url: Set(r.url.clone()),
                merged_at: Set(r.merged_at.map(|t| t.fixed_offset())),
                closed_at: Set(r.closed_at.map(|t| t.fixed_offset())),
                api_created_at: Set(r.created_at.fixed_offset()),
                api_updated_at: Set(r.updated_at.fixed_offset()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
        })
        .collect();

    let on_conflict = OnConflict::columns([
        pull_request::Column::RepositoryId,
        pull_request::Column::ApiId,
    ])
    .update_columns([
        pull_request::Column::Number,
        pull_request::Column::Title,
        pull_request::Column::Author,
        pull_request::Column::TitleFolded,
        pull_request::Column::AuthorFolded,
        pull_request::Column::State,
        pull_request::Column::Draft,
        pull_request::Column::Assignees,
        pull_request::Column::Url,
        pull_request::Column::MergedAt,
        pull_request::Column::ClosedAt,
        pull_request::Column::ApiCreatedAt,
        pull_request::Column::ApiUpdatedAt,
        pull_request::Column::UpdatedAt,
    ])
    .to_owned();

    for chunk in rows.chunks(UPSERT_CHUNK) {
        pull_request::Entity::insert_many(chunk.to_vec())
            .on_conflict(on_conflict.clone())
            .exec_without_returning(conn)
            .await?;
    }
    Ok(records.len() as u64)
}

/// The native status and conclusion are kept next to the canonical state.
pub async fn upsert_workflow_runs<C: ConnectionTrait>(
    conn: &C,
    repository_id: i32,
    dialect: &Dialect,
    records: &[WorkflowRunRecord],
) -> Result<u64, DbErr> {
    let records = last_per_api_id(records, |r| r.api_id.as_str());
    let now = Utc::now().fixed_offset();
    let rows: Vec<workflow_run::ActiveModel> = records
        .iter()
        .map(|r| {
            let state = dialect.workflow_state(&r.native_status, r.conclusion.as_deref());
            workflow_run::ActiveModel {
                repository_id: Set(repository_id),
                api_id: Set(r.api_id.clone()),
                name: Set(r.name.clone()),
                status: Set(state.as_str().to_string()),
                native_status: Set(r.native_status.clone()),
                conclusion: Set(r.conclusion.clone()),
                author: Set(r.author.clone()),
                name_folded: Set(fold_case(&r.name)),
                author_folded: Set(r.author.as_deref().map(fold_case).unwrap_or_default()),
                url: Set(r.url.clone()),
                api_created_at: Set(r.created_at.fixed_offset()),
                api_updated_at: Set(r.updated_at.fixed_offset()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
        })
        .collect();

    let on_conflict = OnConflict::columns([
        workflow_run::Column::RepositoryId,
        workflow_run::Column::ApiId,
    ])
    .update_columns([
        workflow_run::Column::Name,
        workflow_run::Column::Status,
        workflow_run::Column::NativeStatus,
        workflow_run::Column::Conclusion,
        workflow_run::Column::Author,
        workflow_run::Column::NameFolded,
        workflow_run::Column::AuthorFolded,
        workflow_run::Column::Url,
        workflow_run::Column::ApiCreatedAt,
        workflow_run::Column::ApiUpdatedAt,
        workflow_run::Column::UpdatedAt,
    ])
    .to_owned();

    for chunk in rows.chunks(UPSERT_CHUNK) {
        workflow_run::Entity::insert_many(chunk.to_vec())
            .on_conflict(on_conflict.clone())
            .exec_without_returning(conn)
            .await?;
    }
    Ok(records.len() as u64)
}
