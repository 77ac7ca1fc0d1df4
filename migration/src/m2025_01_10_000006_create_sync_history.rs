//! Migration to create the sync_history ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncHistory::Scope).text().not_null())
                    .col(ColumnDef::new(SyncHistory::TargetId).integer().null())
                    .col(ColumnDef::new(SyncHistory::TargetName).text().null())
                    .col(ColumnDef::new(SyncHistory::Status).text().not_null())
                    .col(ColumnDef::new(SyncHistory::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncHistory::ItemsSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncHistory::RepositoriesSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncHistory::ErrorsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncHistory::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncHistory::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncHistory::DurationMs).big_integer().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_history_started_at")
                    .table(SyncHistory::Table)
                    .col(SyncHistory::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncHistory {
    Table,
    Id,
    Scope,
    TargetId,
    TargetName,
    Status,
    ErrorMessage,
    ItemsSynced,
    RepositoriesSynced,
    ErrorsCount,
    StartedAt,
    CompletedAt,
    DurationMs,
}
