//! Migration to create the repositories table.
//!
//! Besides repository metadata, every row carries the outcome of the last
//! sync attempt for each resource kind (issues, pull requests, workflows).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repositories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repositories::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Repositories::ProviderId).integer().not_null())
                    .col(ColumnDef::new(Repositories::ApiId).text().not_null())
                    .col(ColumnDef::new(Repositories::Name).text().not_null())
                    .col(ColumnDef::new(Repositories::FullName).text().not_null())
                    .col(ColumnDef::new(Repositories::WebUrl).text().not_null())
                    .col(ColumnDef::new(Repositories::Description).text().null())
                    .col(
                        ColumnDef::new(Repositories::IsPrivate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Repositories::Language).text().null())
                    .col(
                        ColumnDef::new(Repositories::LastActivityAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::LastIssuesSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Repositories::LastIssuesSyncStatus).text().null())
                    .col(ColumnDef::new(Repositories::LastIssuesSyncError).text().null())
                    .col(
                        ColumnDef::new(Repositories::LastPullRequestsSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::LastPullRequestsSyncStatus)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::LastPullRequestsSyncError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::LastWorkflowsSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::LastWorkflowsSyncStatus)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::LastWorkflowsSyncError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Repositories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_repositories_provider_id")
                            .from(Repositories::Table, Repositories::ProviderId)
                            .to(Providers::Table, Providers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repositories_provider_web_url")
                    .table(Repositories::Table)
                    .col(Repositories::ProviderId)
                    .col(Repositories::WebUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Repositories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Repositories {
    Table,
    Id,
    ProviderId,
    ApiId,
    Name,
    FullName,
    WebUrl,
    Description,
    IsPrivate,
    Language,
    LastActivityAt,
    LastIssuesSyncedAt,
    LastIssuesSyncStatus,
    LastIssuesSyncError,
    LastPullRequestsSyncedAt,
    LastPullRequestsSyncStatus,
    LastPullRequestsSyncError,
    LastWorkflowsSyncedAt,
    LastWorkflowsSyncStatus,
    LastWorkflowsSyncError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
}
