//! Migration to create the pull_requests table.
//!
//! Holds GitHub pull requests and GitLab merge requests alike.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PullRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PullRequests::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::RepositoryId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PullRequests::ApiId).text().not_null())
                    .col(ColumnDef::new(PullRequests::Number).big_integer().not_null())
                    .col(ColumnDef::new(PullRequests::Title).text().not_null())
                    .col(ColumnDef::new(PullRequests::Author).text().not_null())
                    .col(ColumnDef::new(PullRequests::State).text().not_null())
                    .col(
                        ColumnDef::new(PullRequests::Draft)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PullRequests::Assignees)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(PullRequests::Url).text().not_null())
                    .col(
                        ColumnDef::new(PullRequests::MergedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::ApiCreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::ApiUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PullRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PullRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pull_requests_repository_id")
                            .from(PullRequests::Table, PullRequests::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pull_requests_repository_api_id")
                    .table(PullRequests::Table)
                    .col(PullRequests::RepositoryId)
                    .col(PullRequests::ApiId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pull_requests_state_api_created_at")
                    .table(PullRequests::Table)
                    .col(PullRequests::State)
                    .col(PullRequests::ApiCreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PullRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PullRequests {
    Table,
    Id,
    RepositoryId,
    ApiId,
    Number,
    Title,
    Author,
    State,
    Draft,
    Assignees,
    Url,
    MergedAt,
    ClosedAt,
    ApiCreatedAt,
    ApiUpdatedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Repositories {
    Table,
    Id,
}
