//! # gitportal entry point
//!
//! `serve` (the default) runs the HTTP API with the auto-sync scheduler. The
//! other subcommands operate on the same database for one-off use.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gitportal::{
    config::{AppConfig, ConfigLoader},
    connectors::ApiRegistry,
    db,
    handlers::types::SyncHistoryView,
    server::{AppState, run_server},
    telemetry,
};
use tracing::info;

/// Local aggregation of GitHub and GitLab issues, pull requests and workflow runs
#[derive(Parser)]
#[command(name = "gitportal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the auto-sync scheduler
    Serve,
    /// Run one sync to completion and print its history entry
    Sync(SyncArgs),
    /// Print recent sync runs, newest first
    History {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

#[derive(Args)]
#[group(multiple = false)]
struct SyncArgs {
    /// Only this provider
    #[arg(long)]
    provider: Option<i32>,
    /// Only this repository
    #[arg(long)]
    repository: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;
    if let Ok(redacted) = config.redacted_json() {
        info!(profile = %config.profile, config = %redacted, "Configuration loaded");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::run_migrations(&db).await?;

    let config = Arc::new(config);
    let db = Arc::new(db);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config.clone(), db, registry(&config)?).await,
        Commands::Sync(args) => {
            let state = AppState::new(config.clone(), db, registry(&config)?)?;
            let entry = match (args.provider, args.repository) {
                (Some(id), _) => state.orchestrator.sync_provider(id).await?,
                (None, Some(id)) => state.orchestrator.sync_repository(id).await?,
                (None, None) => state.orchestrator.sync_all().await?,
            };
            print_json(&SyncHistoryView::from(entry))
        }
        Commands::History { limit } => {
            let state = AppState::new(config.clone(), db, registry(&config)?)?;
            let entries: Vec<SyncHistoryView> = state
                .orchestrator
                .get_sync_history(limit)
                .await?
                .into_iter()
                .map(SyncHistoryView::from)
                .collect();
            print_json(&entries)
        }
        Commands::Migrate => {
            info!("Migrations applied");
            Ok(())
        }
    }
}

fn registry(config: &AppConfig) -> Result<Arc<ApiRegistry>> {
    let apis = ApiRegistry::with_http_defaults(config.http_timeout())
        .context("building provider HTTP client")?;
    Ok(Arc::new(apis))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
