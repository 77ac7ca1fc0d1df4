//! Migration to create the providers table.
//!
//! Providers hold the connection profile of one GitHub-like or GitLab-like
//! instance. Tokens are only ever stored sealed (`token_ciphertext`).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Providers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Providers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Providers::Name).text().not_null())
                    .col(ColumnDef::new(Providers::Kind).text().not_null())
                    .col(ColumnDef::new(Providers::BaseUrl).text().not_null())
                    .col(ColumnDef::new(Providers::ApiBaseUrl).text().not_null())
                    .col(ColumnDef::new(Providers::TokenCiphertext).binary().null())
                    .col(
                        ColumnDef::new(Providers::TokenValid)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Providers::TokenValidatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Providers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Providers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_providers_name")
                    .table(Providers::Table)
                    .col(Providers::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Providers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
    Name,
    Kind,
    BaseUrl,
    ApiBaseUrl,
    TokenCiphertext,
    TokenValid,
    TokenValidatedAt,
    CreatedAt,
    UpdatedAt,
}
