//! Provider entity model
//!
//! A provider is one configured GitHub-like or GitLab-like instance together
//! with its sealed access token and the last known validity of that token.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Display name, unique across providers
    #[sea_orm(unique)]
    pub name: String,

    /// Lower-cased `name` used by case-insensitive filters
    pub name_folded: String,

    /// Provider kind (`github` or `gitlab`)
    pub kind: String,

    /// Web base URL, e.g. `https://github.com`
    pub base_url: String,

    /// REST API base URL, e.g. `https://api.github.com`
    pub api_base_url: String,

    /// AES-GCM sealed token; `None` when no token is configured
    #[sea_orm(column_type = "VarBinary(StringLen::None)", nullable)]
    pub token_ciphertext: Option<Vec<u8>>,

    /// Result of the last explicit token validation
    pub token_valid: bool,

    pub token_validated_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::repository::Entity")]
    Repository,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
