//! WorkflowRun entity model (GitHub Actions runs, GitLab pipelines)

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "workflow_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub repository_id: i32,

    pub api_id: String,

    pub name: String,

    /// Canonical state: `success`, `failure`, `in_progress` or `cancelled`
    pub status: String,

    /// Status string exactly as reported by the provider
    pub native_status: String,

    /// Conclusion as reported by the provider, when it has one
    pub conclusion: Option<String>,

    /// Login of the user that triggered the run
    pub author: Option<String>,

    /// Lower-cased copies of `name` and `author` (empty when absent)
    pub name_folded: String,

    pub author_folded: String,

    pub url: String,

    pub api_created_at: DateTimeWithTimeZone,

    pub api_updated_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::repository::Entity",
        from = "Column::RepositoryId",
        to = "super::repository::Column::Id",
        on_delete = "Cascade"
    )]
    Repository,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
