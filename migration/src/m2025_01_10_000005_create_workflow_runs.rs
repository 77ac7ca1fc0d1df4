//! Migration to create the workflow_runs table.
//!
//! `status` holds the canonical state; the provider's raw `native_status`
//! and `conclusion` strings are kept next to it for display.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorkflowRuns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorkflowRuns::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::RepositoryId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WorkflowRuns::ApiId).text().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Name).text().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Status).text().not_null())
                    .col(ColumnDef::new(WorkflowRuns::NativeStatus).text().not_null())
                    .col(ColumnDef::new(WorkflowRuns::Conclusion).text().null())
                    .col(ColumnDef::new(WorkflowRuns::Author).text().null())
                    .col(ColumnDef::new(WorkflowRuns::Url).text().not_null())
                    .col(
                        ColumnDef::new(WorkflowRuns::ApiCreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::ApiUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkflowRuns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_workflow_runs_repository_id")
                            .from(WorkflowRuns::Table, WorkflowRuns::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_repository_api_id")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::RepositoryId)
                    .col(WorkflowRuns::ApiId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_workflow_runs_status_api_created_at")
                    .table(WorkflowRuns::Table)
                    .col(WorkflowRuns::Status)
                    .col(WorkflowRuns::ApiCreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorkflowRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorkflowRuns {
    Table,
    Id,
    RepositoryId,
    ApiId,
    Name,
    Status,
    NativeStatus,
    Conclusion,
    Author,
    Url,
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
