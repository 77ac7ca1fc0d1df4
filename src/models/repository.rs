//! Repository entity model
//!
//! Repositories belong to a provider and carry per-resource sync metadata:
//! for each of issues, pull requests and workflows the time of the last
//! successful sync, the terminal status of the last attempt and its error.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub provider_id: i32,

    /// Identifier of the repository in the provider API
    pub api_id: String,

    pub name: String,

    /// Namespaced path, e.g. `owner/repo` or `group/sub/project`
    pub full_name: String,

    pub name_folded: String,

    pub full_name_folded: String,

    /// Canonical web URL, unique per provider
    pub web_url: String,

    pub description: Option<String>,

    pub is_private: bool,

    pub language: Option<String>,

    pub last_activity_at: Option<DateTimeWithTimeZone>,

    /// Last successful issues sync; also the `since` cursor of the next one
    pub last_issues_synced_at: Option<DateTimeWithTimeZone>,
    /// `success` or `failure`
    pub last_issues_sync_status: Option<String>,
    pub last_issues_sync_error: Option<String>,

    pub last_pull_requests_synced_at: Option<DateTimeWithTimeZone>,
    pub last_pull_requests_sync_status: Option<String>,
    pub last_pull_requests_sync_error: Option<String>,

    pub last_workflows_synced_at: Option<DateTimeWithTimeZone>,
    pub last_workflows_sync_status: Option<String>,
    pub last_workflows_sync_error: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::provider::Entity",
        from = "Column::ProviderId",
        to = "super::provider::Column::Id",
        on_delete = "Cascade"
    )]
    Provider,
    #[sea_orm(has_many = "super::issue::Entity")]
    Issue,
    #[sea_orm(has_many = "super::pull_request::Entity")]
    PullRequest,
    #[sea_orm(has_many = "super::workflow_run::Entity")]
    WorkflowRun,
}

impl Related<super::provider::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl Related<super::issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issue.def()
    }
}

impl Related<super::pull_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PullRequest.def()
    }
}

impl Related<super::workflow_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkflowRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
