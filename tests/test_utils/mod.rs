//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite with migrations applied, a fixed sealing key, and
//! [`MockProviderApi`], an in-process provider whose pages and failures are
//! scripted per repository.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gitportal::config::SyncConfig;
use gitportal::connectors::{
    ApiRegistry, FetchError, IssueRecord, Page, PageRequest, ProviderApi, ProviderEndpoint,
    PullRequestRecord, RepositoryRecord, RepositoryRef, WorkflowRunRecord,
};
use gitportal::credentials::CredentialVault;
use gitportal::crypto::{CryptoKey, SecretToken};
use gitportal::models::{provider, repository};
use gitportal::normalization::ProviderKind;
use gitportal::query::QueryEngine;
use gitportal::repositories::{NewProvider, ProviderRepository, RepositoryStore};
use gitportal::sync_orchestrator::SyncOrchestrator;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

pub fn test_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("32-byte key")
}

pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn issue(api_id: &str, number: i64, state: &str, assignees: &[&str]) -> IssueRecord {
    IssueRecord {
        api_id: api_id.to_string(),
        number,
        title: format!("Issue {number}"),
        author: "octocat".to_string(),
        native_state: state.to_string(),
        labels: vec!["bug".to_string()],
        assignees: assignees.iter().map(|a| a.to_string()).collect(),
        url: format!("https://github.com/acme/app/issues/{number}"),
        closed_at: (state == "closed").then(|| ts(2, 0)),
        created_at: ts(1, number as u32 % 24),
        updated_at: ts(2, 0),
    }
}

pub fn pull_request(api_id: &str, number: i64, state: &str, merged: bool) -> PullRequestRecord {
    PullRequestRecord {
        api_id: api_id.to_string(),
        number,
        title: format!("Change {number}"),
        author: "hubot".to_string(),
        native_state: state.to_string(),
        draft: false,
        assignees: vec![],
        url: format!("https://github.com/acme/app/pull/{number}"),
        merged_at: merged.then(|| ts(3, 0)),
        closed_at: (state == "closed").then(|| ts(3, 0)),
        created_at: ts(1, number as u32 % 24),
        updated_at: ts(3, 0),
    }
}

pub fn workflow_run(
    api_id: &str,
    status: &str,
    conclusion: Option<&str>,
    author: &str,
) -> WorkflowRunRecord {
    WorkflowRunRecord {
        api_id: api_id.to_string(),
        name: "CI".to_string(),
        native_status: status.to_string(),
        conclusion: conclusion.map(str::to_string),
        author: Some(author.to_string()),
        url: format!("https://github.com/acme/app/actions/runs/{api_id}"),
        created_at: ts(4, 0),
        updated_at: ts(4, 1),
    }
}

type Script<T> = HashMap<String, Vec<Result<Page<T>, FetchError>>>;

#[derive(Default)]
struct MockState {
    token_result: Option<FetchError>,
    missing_repositories: Vec<String>,
    issues: Script<IssueRecord>,
    pull_requests: Script<PullRequestRecord>,
    workflow_runs: Script<WorkflowRunRecord>,
    calls: Vec<String>,
    delay: Option<Duration>,
}

/// Scripted in-process provider. Unscripted fetches return one empty page;
/// unknown repositories resolve to metadata derived from their path.
pub struct MockProviderApi {
    kind: ProviderKind,
    state: Mutex<MockState>,
}

impl MockProviderApi {
    pub fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            state: Mutex::new(MockState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn reject_tokens(&self, error: Option<FetchError>) {
        self.state().token_result = error;
    }

    pub fn hide_repository(&self, full_name: &str) {
        self.state().missing_repositories.push(full_name.to_string());
    }

    pub fn script_issues(&self, full_name: &str, pages: Vec<Result<Page<IssueRecord>, FetchError>>) {
        self.state().issues.insert(full_name.to_string(), pages);
    }

    pub fn script_pull_requests(
        &self,
        full_name: &str,
        pages: Vec<Result<Page<PullRequestRecord>, FetchError>>,
    ) {
        self.state()
            .pull_requests
            .insert(full_name.to_string(), pages);
    }

    pub fn script_workflow_runs(
        &self,
        full_name: &str,
        pages: Vec<Result<Page<WorkflowRunRecord>, FetchError>>,
    ) {
        self.state()
            .workflow_runs
            .insert(full_name.to_string(), pages);
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn page_of<T: Clone>(
        script: &Script<T>,
        full_name: &str,
        page: PageRequest,
    ) -> Result<Page<T>, FetchError> {
        match script.get(full_name) {
            None => Ok(Page::last(Vec::new())),
            Some(pages) => pages
                .get(page.page as usize - 1)
                .cloned()
                .unwrap_or_else(|| Ok(Page::last(Vec::new()))),
        }
    }
}

#[async_trait]
impl ProviderApi for MockProviderApi {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn validate_token(&self, endpoint: &ProviderEndpoint) -> Result<(), FetchError> {
        let mut state = self.state();
        state
            .calls
            .push(format!("validate:{}", endpoint.token.expose()));
        match state.token_result.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_repository(
        &self,
        _endpoint: &ProviderEndpoint,
        full_name: &str,
    ) -> Result<RepositoryRecord, FetchError> {
        let mut state = self.state();
        state.calls.push(format!("repository:{full_name}"));
        if state.missing_repositories.iter().any(|r| r == full_name) {
            return Err(FetchError::not_found(full_name));
        }
        let name = full_name.rsplit('/').next().unwrap_or(full_name);
        Ok(RepositoryRecord {
            api_id: format!("repo-{full_name}"),
            name: name.to_string(),
            full_name: full_name.to_string(),
            web_url: format!("https://github.com/{full_name}"),
            description: Some(format!("{name} description")),
            is_private: false,
            language: Some("Rust".to_string()),
            last_activity_at: Some(ts(5, 0)),
        })
    }

    async fn fetch_issues(
        &self,
        _endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<IssueRecord>, FetchError> {
        self.pause().await;
        let mut state = self.state();
        state
            .calls
            .push(format!("issues:{}:{}", repository.full_name, page.page));
        Self::page_of(&state.issues, &repository.full_name, page)
    }

    async fn fetch_pull_requests(
        &self,
        _endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<PullRequestRecord>, FetchError> {
        self.pause().await;
        let mut state = self.state();
        state
            .calls
            .push(format!("pull_requests:{}:{}", repository.full_name, page.page));
        Self::page_of(&state.pull_requests, &repository.full_name, page)
    }

    async fn fetch_workflow_runs(
        &self,
        _endpoint: &ProviderEndpoint,
        repository: &RepositoryRef,
        page: PageRequest,
    ) -> Result<Page<WorkflowRunRecord>, FetchError> {
        self.pause().await;
        let mut state = self.state();
        state
            .calls
            .push(format!("workflows:{}:{}", repository.full_name, page.page));
        Self::page_of(&state.workflow_runs, &repository.full_name, page)
    }
}

/// Every engine service wired over one in-memory database and one
/// [`MockProviderApi`] registered for GitHub.
pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub api: Arc<MockProviderApi>,
    pub providers: ProviderRepository,
    pub vault: CredentialVault,
    pub repositories: RepositoryStore,
    pub orchestrator: SyncOrchestrator,
    pub queries: QueryEngine,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        Self::with_options(SyncConfig::default(), Some("octocat")).await
    }

    pub async fn with_options(sync: SyncConfig, operator: Option<&str>) -> Result<Self> {
        let db = setup_test_db().await?;
        let api = MockProviderApi::new(ProviderKind::Github);
        let mut registry = ApiRegistry::new();
        registry.register(api.clone());
        let apis = Arc::new(registry);

        let providers = ProviderRepository::new(db.clone(), test_key());
        let vault = CredentialVault::new(providers.clone(), apis.clone());
        let repositories = RepositoryStore::new(db.clone(), providers.clone(), apis.clone());
        let orchestrator = SyncOrchestrator::new(
            db.clone(),
            vault.clone(),
            repositories.clone(),
            apis,
            sync,
        );
        let queries = QueryEngine::new(db.clone(), operator.map(str::to_string));

        Ok(Self {
            db,
            api,
            providers,
            vault,
            repositories,
            orchestrator,
            queries,
        })
    }

    pub async fn github(&self, name: &str, token: Option<&str>) -> Result<provider::Model> {
        Ok(self
            .providers
            .register(NewProvider {
                name: name.to_string(),
                kind: ProviderKind::Github,
                base_url: "https://github.com".to_string(),
                api_base_url: "https://api.github.com".to_string(),
                token: token.map(SecretToken::new),
            })
            .await?)
    }

    pub async fn track(&self, provider_id: i32, full_name: &str) -> Result<repository::Model> {
        Ok(self
            .repositories
            .add(provider_id, &format!("https://github.com/{full_name}"))
            .await?)
    }
}
