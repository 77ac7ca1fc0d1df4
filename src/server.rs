//! # Server Configuration
//!
//! Router assembly, shared state and the serve loop. The auto-sync scheduler
//! runs next to the HTTP server and stops with it.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AppConfig, ConfigError};
use crate::connectors::ApiRegistry;
use crate::credentials::CredentialVault;
use crate::handlers::{self, providers, repositories, resources, settings, sync};
use crate::query::QueryEngine;
use crate::repositories::{ProviderRepository, RepositoryStore};
use crate::scheduler::AutoSyncScheduler;
use crate::settings::{SettingsStore, SyncSettings};
use crate::sync_orchestrator::SyncOrchestrator;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub vault: CredentialVault,
    pub repositories: RepositoryStore,
    pub orchestrator: SyncOrchestrator,
    pub queries: QueryEngine,
    pub settings: SettingsStore,
}

impl AppState {
    /// Wires every service over one pool and one provider API registry.
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        apis: Arc<ApiRegistry>,
    ) -> Result<Self, ConfigError> {
        let providers = ProviderRepository::new(db.clone(), config.crypto_key()?);
        let vault = CredentialVault::new(providers.clone(), apis.clone());
        let repositories = RepositoryStore::new(db.clone(), providers, apis.clone());
        let orchestrator = SyncOrchestrator::new(
            db.clone(),
            vault.clone(),
            repositories.clone(),
            apis,
            config.sync.clone(),
        );
        let queries = QueryEngine::new(db.clone(), config.operator_login.clone());
        let settings = SettingsStore::new(SyncSettings::from(&config.scheduler));

        Ok(Self {
            config,
            db,
            vault,
            repositories,
            orchestrator,
            queries,
            settings,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route(
            "/providers",
            get(providers::list_providers).post(providers::create_provider),
        )
        .route(
            "/providers/{id}",
            get(providers::get_provider).delete(providers::delete_provider),
        )
        .route("/providers/{id}/token", put(providers::update_token))
        .route("/providers/{id}/validate", post(providers::validate_token))
        .route(
            "/repositories",
            get(repositories::list_repositories).post(repositories::add_repository),
        )
        .route(
            "/repositories/{id}",
            get(repositories::get_repository).delete(repositories::delete_repository),
        )
        .route("/issues", get(resources::list_issues))
        .route("/issues/stats", get(resources::issue_stats))
        .route("/issues/{id}", get(resources::get_issue))
        .route("/pull-requests", get(resources::list_pull_requests))
        .route("/pull-requests/stats", get(resources::pull_request_stats))
        .route("/pull-requests/{id}", get(resources::get_pull_request))
        .route("/workflows", get(resources::list_workflows))
        .route("/workflows/stats", get(resources::workflow_stats))
        .route("/workflows/{id}", get(resources::get_workflow))
        .route("/sync/all", post(sync::sync_all))
        .route("/sync/providers/{id}", post(sync::sync_provider))
        .route("/sync/repositories/{id}", post(sync::sync_repository))
        .route("/sync/status", get(sync::sync_status))
        .route("/sync/lock/release", post(sync::release_lock))
        .route("/sync/history", get(sync::sync_history))
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Starts the HTTP server and the auto-sync scheduler; returns after ctrl-c.
pub async fn run_server(
    config: Arc<AppConfig>,
    db: Arc<DatabaseConnection>,
    apis: Arc<ApiRegistry>,
) -> anyhow::Result<()> {
    let state = AppState::new(config.clone(), db, apis)?;

    let shutdown = CancellationToken::new();
    let scheduler = AutoSyncScheduler::new(
        state.orchestrator.clone(),
        state.settings.clone(),
        &config.scheduler,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let app = create_app(state);
    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = scheduler_handle.await {
        tracing::warn!(error = %err, "Scheduler task ended abnormally");
    }
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::providers::list_providers,
        crate::handlers::providers::create_provider,
        crate::handlers::providers::get_provider,
        crate::handlers::providers::delete_provider,
        crate::handlers::providers::update_token,
        crate::handlers::providers::validate_token,
        crate::handlers::repositories::list_repositories,
        crate::handlers::repositories::add_repository,
        crate::handlers::repositories::get_repository,
        crate::handlers::repositories::delete_repository,
        crate::handlers::resources::list_issues,
        crate::handlers::resources::issue_stats,
        crate::handlers::resources::get_issue,
        crate::handlers::resources::list_pull_requests,
        crate::handlers::resources::pull_request_stats,
        crate::handlers::resources::get_pull_request,
        crate::handlers::resources::list_workflows,
        crate::handlers::resources::workflow_stats,
        crate::handlers::resources::get_workflow,
        crate::handlers::sync::sync_all,
        crate::handlers::sync::sync_provider,
        crate::handlers::sync::sync_repository,
        crate::handlers::sync::sync_status,
        crate::handlers::sync::release_lock,
        crate::handlers::sync::sync_history,
        crate::handlers::settings::get_settings,
        crate::handlers::settings::update_settings,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::types::HealthResponse,
            crate::handlers::types::ProviderView,
            crate::handlers::types::CreateProviderRequest,
            crate::handlers::types::UpdateTokenRequest,
            crate::handlers::types::TokenValidationResponse,
            crate::handlers::types::AddRepositoryRequest,
            crate::handlers::types::RepositoryView,
            crate::handlers::types::ResourceSyncView,
            crate::handlers::types::SyncHistoryView,
            crate::handlers::types::SyncStatusResponse,
            crate::handlers::types::LockReleaseResponse,
            crate::query::IssueView,
            crate::query::PullRequestView,
            crate::query::WorkflowView,
            crate::query::PaginationMeta,
            crate::query::StateCounts,
            crate::settings::SyncSettings,
        )
    ),
    tags(
        (name = "providers", description = "Provider profiles and tokens"),
        (name = "repositories", description = "Tracked repositories"),
        (name = "issues", description = "Synced issues"),
        (name = "pull-requests", description = "Synced pull and merge requests"),
        (name = "workflows", description = "Synced workflow runs and pipelines"),
        (name = "sync", description = "Sync triggers, lock and history"),
        (name = "settings", description = "Auto-sync settings"),
    ),
    info(
        title = "gitportal API",
        description = "Local aggregation of issues, pull requests and workflow runs across GitHub and GitLab instances",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
