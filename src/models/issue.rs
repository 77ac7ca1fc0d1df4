//! Issue entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub repository_id: i32,

    /// Provider identifier; unique together with `repository_id`
    pub api_id: String,

    /// Human-facing number (`#42`, GitLab `iid`)
    pub number: i64,

    pub title: String,

    pub author: String,

    /// Lower-cased copies of `title` and `author` for search
    pub title_folded: String,

    pub author_folded: String,

    /// Canonical state: `open` or `closed`
    pub state: String,

    /// JSON array of label names
    #[sea_orm(column_type = "Json")]
    pub labels: JsonValue,

    /// Lower-cased assignee logins in `|a|b|` form
    pub assignees: String,

    pub url: String,

    pub closed_at: Option<DateTimeWithTimeZone>,

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
