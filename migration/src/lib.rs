//! Database migrations for the GitPortal sync engine.
//!
//! Each create migration owns one table of the local projection; later
//! migrations alter them in place.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_providers;
mod m2025_01_10_000002_create_repositories;
mod m2025_01_10_000003_create_issues;
mod m2025_01_10_000004_create_pull_requests;
mod m2025_01_10_000005_create_workflow_runs;
mod m2025_01_10_000006_create_sync_history;
mod m2025_01_10_000007_add_folded_search_columns;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_providers::Migration),
            Box::new(m2025_01_10_000002_create_repositories::Migration),
            Box::new(m2025_01_10_000003_create_issues::Migration),
            Box::new(m2025_01_10_000004_create_pull_requests::Migration),
            Box::new(m2025_01_10_000005_create_workflow_runs::Migration),
            Box::new(m2025_01_10_000006_create_sync_history::Migration),
            Box::new(m2025_01_10_000007_add_folded_search_columns::Migration),
        ]
    }
}
