//! Migration adding case-folded copies of the columns the query engine
//! filters and searches on.
//!
//! SQL `LOWER()` only folds ASCII on SQLite, so the engine lower-cases these
//! values itself at write time and compares against the stored copies.
//! Existing rows are backfilled with `LOWER()`; the next upsert refreshes
//! resource rows with the full Unicode folding.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// `(table, source column, folded column)`
const FOLDED: &[(&str, &str, &str)] = &[
    ("providers", "name", "name_folded"),
    ("repositories", "name", "name_folded"),
    ("repositories", "full_name", "full_name_folded"),
    ("issues", "title", "title_folded"),
    ("issues", "author", "author_folded"),
    ("pull_requests", "title", "title_folded"),
    ("pull_requests", "author", "author_folded"),
    ("workflow_runs", "name", "name_folded"),
    ("workflow_runs", "author", "author_folded"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite accepts one ADD COLUMN per ALTER TABLE.
        for (table, source, folded) in FOLDED {
            manager
                .alter_table(
                    Table::alter()
                        .table(Alias::new(*table))
                        .add_column(
                            ColumnDef::new(Alias::new(*folded))
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .exec_stmt(
                    Query::update()
                        .table(Alias::new(*table))
                        .value(
                            Alias::new(*folded),
                            Func::coalesce([
                                Func::lower(Expr::col(Alias::new(*source))).into(),
                                Expr::val("").into(),
                            ]),
                        )
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (table, _, folded) in FOLDED.iter().rev() {
            manager
                .alter_table(
                    Table::alter()
                        .table(Alias::new(*table))
                        .drop_column(Alias::new(*folded))
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }
}
