//! SyncHistory entity model
//!
//! One row per sync run. The row is inserted as `started` before any work
//! happens and finalized in place as `completed` or `failed`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// `provider`, `all_providers` or `repository`
    pub scope: String,

    /// Provider or repository id; `None` for `all_providers`
    pub target_id: Option<i32>,

    pub target_name: Option<String>,

    /// `started`, `completed` or `failed`
    pub status: String,

    pub error_message: Option<String>,

    pub items_synced: i32,

    pub repositories_synced: i32,

    pub errors_count: i32,

    pub started_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,

    pub duration_ms: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
