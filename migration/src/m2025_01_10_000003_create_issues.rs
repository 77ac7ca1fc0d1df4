//! Migration to create the issues table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Issues::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Issues::RepositoryId).integer().not_null())
                    .col(ColumnDef::new(Issues::ApiId).text().not_null())
                    .col(ColumnDef::new(Issues::Number).big_integer().not_null())
                    .col(ColumnDef::new(Issues::Title).text().not_null())
                    .col(ColumnDef::new(Issues::Author).text().not_null())
                    .col(ColumnDef::new(Issues::State).text().not_null())
                    .col(ColumnDef::new(Issues::Labels).json().not_null())
                    .col(
                        ColumnDef::new(Issues::Assignees)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Issues::Url).text().not_null())
                    .col(
                        ColumnDef::new(Issues::ClosedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Issues::ApiCreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Issues::ApiUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Issues::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Issues::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_issues_repository_id")
                            .from(Issues::Table, Issues::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Upsert key.
        manager
            .create_index(
                Index::create()
                    .name("idx_issues_repository_api_id")
                    .table(Issues::Table)
                    .col(Issues::RepositoryId)
                    .col(Issues::ApiId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_issues_state_api_created_at")
                    .table(Issues::Table)
                    .col(Issues::State)
                    .col(Issues::ApiCreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Issues::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Issues {
    Table,
    Id,
    RepositoryId,
    ApiId,
    Number,
    Title,
    Author,
    State,
    Labels,
    Assignees,
    Url,
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
