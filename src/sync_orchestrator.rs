//! Sync orchestrator
//!
//! One run walks providers → repositories → resource kinds while holding the
//! [`SyncLock`]. Each `(repository, resource kind)` pair is an independent
//! unit: it fetches every page, then upserts the records and marks the
//! repository in a single transaction, or records a failure. Failed units
//! never abort their siblings. The lock guard lives until every spawned unit
//! has been joined.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::connectors::{
    ApiRegistry, FetchError, IssueRecord, Page, PageRequest, ProviderApi, ProviderEndpoint,
    PullRequestRecord, RepositoryRef, WorkflowRunRecord,
};
use crate::credentials::CredentialVault;
use crate::error::{EngineError, EngineResult};
use crate::models::{provider, repository, sync_history};
use crate::normalization::{Dialect, ResourceKind};
use crate::repositories::repository::{last_synced_at, mark_failure, mark_success};
use crate::repositories::resources::{upsert_issues, upsert_pull_requests, upsert_workflow_runs};
use crate::repositories::{RepositoryStore, SyncCounts, SyncHistoryRepository};
use crate::sync_lock::{LockHolder, SyncLock};

/// What a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    AllProviders,
    Provider(i32),
    Repository(i32),
}

impl SyncTarget {
    pub fn scope(&self) -> &'static str {
        match self {
            SyncTarget::AllProviders => "all_providers",
            SyncTarget::Provider(_) => "provider",
            SyncTarget::Repository(_) => "repository",
        }
    }

    pub fn target_id(&self) -> Option<i32> {
        match self {
            SyncTarget::AllProviders => None,
            SyncTarget::Provider(id) | SyncTarget::Repository(id) => Some(*id),
        }
    }
}

/// Snapshot for status queries.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub in_progress: bool,
    pub holder: Option<LockHolder>,
}

/// A provider and the repositories a run will process for it.
struct ProviderPlan {
    provider: provider::Model,
    repositories: Vec<repository::Model>,
}

/// Everything a unit needs to talk to one provider.
struct ProviderContext {
    api: Arc<dyn ProviderApi>,
    endpoint: ProviderEndpoint,
    dialect: &'static Dialect,
}

#[derive(Debug)]
struct UnitOutcome {
    repository_id: i32,
    items: u64,
    failed: bool,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    db: Arc<DatabaseConnection>,
    vault: CredentialVault,
    repositories: RepositoryStore,
    history: SyncHistoryRepository,
    apis: Arc<ApiRegistry>,
    lock: SyncLock,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        vault: CredentialVault,
        repositories: RepositoryStore,
        apis: Arc<ApiRegistry>,
        config: SyncConfig,
    ) -> Self {
        Self {
            history: SyncHistoryRepository::new(db.clone()),
            db,
            vault,
            repositories,
            apis,
            lock: SyncLock::new(),
            config,
        }
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    pub fn history(&self) -> &SyncHistoryRepository {
        &self.history
    }

    pub async fn sync_all(&self) -> EngineResult<sync_history::Model> {
        self.run(SyncTarget::AllProviders).await
    }

    pub async fn sync_provider(&self, provider_id: i32) -> EngineResult<sync_history::Model> {
        self.run(SyncTarget::Provider(provider_id)).await
    }

    pub async fn sync_repository(&self, repository_id: i32) -> EngineResult<sync_history::Model> {
        self.run(SyncTarget::Repository(repository_id)).await
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.lock.is_held()
    }

    pub fn status(&self) -> SyncStatus {
        let holder = self.lock.holder();
        SyncStatus {
            in_progress: holder.is_some(),
            holder,
        }
    }

    /// Operator escape hatch for a stuck lock. Upserts already committed by
    /// the abandoned run stay in place.
    pub fn force_release_lock(&self) -> bool {
        self.lock.force_release()
    }

    pub async fn get_sync_history(&self, limit: Option<u64>) -> EngineResult<Vec<sync_history::Model>> {
        self.history.list(limit).await
    }

    /// Executes one run and returns its finalized history entry.
    ///
    /// The run body executes on its own task and owns the lock guard, so a
    /// caller that stops polling (a disconnected HTTP client) neither
    /// releases the lock early nor leaves the history entry at `started`.
    #[instrument(skip(self), fields(scope = target.scope(), target_id = ?target.target_id()))]
    pub async fn run(&self, target: SyncTarget) -> EngineResult<sync_history::Model> {
        let guard = self.lock.try_acquire(target)?;
        let orchestrator = self.clone();
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                orchestrator.run_locked(target).await
            }
            .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                std::panic::resume_unwind(join_err.into_panic())
            }
            Err(join_err) => {
                error!(error = %join_err, "Sync run task cancelled");
                Err(EngineError::Internal("sync run cancelled".into()))
            }
        }
    }

    async fn run_locked(&self, target: SyncTarget) -> EngineResult<sync_history::Model> {
        gauge!("sync_in_progress").set(1.0);
        let _in_progress = scopeguard::guard((), |_| gauge!("sync_in_progress").set(0.0));

        let timer = Instant::now();
        let entry = self
            .history
            .start(target.scope(), target.target_id(), None)
            .await?;
        info!(history_id = entry.id, "Sync run started");

        let (target_name, plans) = match self.resolve(target).await {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!(history_id = entry.id, error = %err, "Sync run could not start");
                self.history.fail(entry, err.summary()).await?;
                record_run(target, "failed", timer);
                return Err(err);
            }
        };
        let entry = match target_name {
            Some(name) => match self.history.set_target_name(entry.clone(), name).await {
                Ok(named) => named,
                Err(err) => return Err(self.abandon(target, entry, err, timer).await),
            },
            None => entry,
        };

        let outcomes = self.execute(plans).await;
        let counts = aggregate(&outcomes);
        let error_message = (counts.errors_count > 0).then(|| {
            format!(
                "{} of {} resource syncs failed",
                counts.errors_count,
                outcomes.len()
            )
        });

        let finalized = match self
            .history
            .complete(entry.clone(), counts, error_message)
            .await
        {
            Ok(finalized) => finalized,
            Err(err) => return Err(self.abandon(target, entry, err, timer).await),
        };
        record_run(target, "completed", timer);
        info!(
            history_id = finalized.id,
            items_synced = counts.items_synced,
            repositories_synced = counts.repositories_synced,
            errors = counts.errors_count,
            duration_ms = finalized.duration_ms.unwrap_or_default(),
            "Sync run completed"
        );
        Ok(finalized)
    }

    /// Best-effort `failed` finalization after a history write went wrong.
    async fn abandon(
        &self,
        target: SyncTarget,
        entry: sync_history::Model,
        err: EngineError,
        timer: Instant,
    ) -> EngineError {
        error!(history_id = entry.id, error = %err, "Sync history update failed");
        if let Err(fail_err) = self.history.fail(entry, err.summary()).await {
            error!(error = %fail_err, "Sync history entry could not be marked failed");
        }
        record_run(target, "failed", timer);
        err
    }

    /// Loads the providers and repositories a run covers, in id order.
    async fn resolve(
        &self,
        target: SyncTarget,
    ) -> EngineResult<(Option<String>, Vec<ProviderPlan>)> {
        let providers = self.vault.providers();
        match target {
            SyncTarget::AllProviders => {
                let mut plans = Vec::new();
                for provider in providers.list().await? {
                    let repositories = self.repositories.list(Some(provider.id)).await?;
                    plans.push(ProviderPlan {
                        provider,
                        repositories,
                    });
                }
                Ok((None, plans))
            }
            SyncTarget::Provider(id) => {
                let provider = providers.get(id).await?;
                let repositories = self.repositories.list(Some(provider.id)).await?;
                let name = provider.name.clone();
                Ok((
                    Some(name),
                    vec![ProviderPlan {
                        provider,
                        repositories,
                    }],
                ))
            }
            SyncTarget::Repository(id) => {
                let repository = self.repositories.get(id).await?;
                let provider = providers.get(repository.provider_id).await?;
                let name = repository.full_name.clone();
                Ok((
                    Some(name),
                    vec![ProviderPlan {
                        provider,
                        repositories: vec![repository],
                    }],
                ))
            }
        }
    }

    /// Validates the token when the cached flag says so and resolves the client.
    async fn prepare(&self, provider: &provider::Model) -> EngineResult<ProviderContext> {
        self.vault.ensure_valid(provider).await?;
        let endpoint = self.vault.providers().endpoint(provider)?;
        let api = self
            .apis
            .get(endpoint.kind)
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        Ok(ProviderContext {
            api,
            dialect: endpoint.kind.dialect(),
            endpoint,
        })
    }

    async fn execute(&self, plans: Vec<ProviderPlan>) -> Vec<UnitOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut outcomes = Vec::new();
        let mut handles: Vec<(i32, ResourceKind, JoinHandle<UnitOutcome>)> = Vec::new();

        for plan in plans {
            let provider_id = plan.provider.id;
            let context = match self.prepare(&plan.provider).await {
                Ok(context) => Arc::new(context),
                Err(err) => {
                    warn!(provider_id, reason = err.reason(), "Provider unusable for sync");
                    for repository in &plan.repositories {
                        for kind in ResourceKind::ALL {
                            outcomes.push(self.record_failure(repository.id, kind, &err).await);
                        }
                    }
                    continue;
                }
            };

            for repository in plan.repositories {
                for kind in ResourceKind::ALL {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            error!("Sync worker pool closed");
                            break;
                        }
                    };
                    let orchestrator = self.clone();
                    let context = context.clone();
                    let repository = repository.clone();
                    let repository_id = repository.id;
                    let handle = tokio::spawn(async move {
                        let _permit = permit;
                        orchestrator.sync_unit(&context, &repository, kind).await
                    });
                    handles.push((repository_id, kind, handle));
                }
            }
        }

        for (repository_id, kind, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    error!(repository_id, resource = kind.as_str(), error = %join_err, "Sync task aborted");
                    let err = EngineError::Malformed("sync task aborted unexpectedly".into());
                    outcomes.push(self.record_failure(repository_id, kind, &err).await);
                }
            }
        }

        outcomes
    }

    #[instrument(
        skip_all,
        fields(repository_id = repository.id, resource = kind.as_str())
    )]
    async fn sync_unit(
        &self,
        context: &ProviderContext,
        repository: &repository::Model,
        kind: ResourceKind,
    ) -> UnitOutcome {
        let started_at = Utc::now();
        match self.fetch_and_store(context, repository, kind, started_at).await {
            Ok(items) => {
                counter!("sync_items_upserted_total", "resource" => kind.as_str()).increment(items);
                debug!(items, "Resource synced");
                UnitOutcome {
                    repository_id: repository.id,
                    items,
                    failed: false,
                }
            }
            Err(err) => self.record_failure(repository.id, kind, &err).await,
        }
    }

    async fn fetch_and_store(
        &self,
        context: &ProviderContext,
        repository: &repository::Model,
        kind: ResourceKind,
        started_at: chrono::DateTime<Utc>,
    ) -> EngineResult<u64> {
        let api: &dyn ProviderApi = context.api.as_ref();
        let endpoint = &context.endpoint;
        let reference = RepositoryRef {
            api_id: repository.api_id.clone(),
            full_name: repository.full_name.clone(),
        };
        let reference = &reference;
        let since = last_synced_at(repository, kind);
        let (max_pages, per_page) = (self.config.max_pages, self.config.page_size);

        // Fetch everything first so the transaction never waits on the network.
        let fetched = match kind {
            ResourceKind::Issues => Fetched::Issues(
                collect_pages(max_pages, per_page, since, move |page| {
                    api.fetch_issues(endpoint, reference, page)
                })
                .await?,
            ),
            ResourceKind::PullRequests => Fetched::PullRequests(
                collect_pages(max_pages, per_page, since, move |page| {
                    api.fetch_pull_requests(endpoint, reference, page)
                })
                .await?,
            ),
            ResourceKind::Workflows => Fetched::Workflows(
                collect_pages(max_pages, per_page, since, move |page| {
                    api.fetch_workflow_runs(endpoint, reference, page)
                })
                .await?,
            ),
        };

        let txn = self.db.begin().await?;
        let items = match &fetched {
            Fetched::Issues(records) => {
                upsert_issues(&txn, repository.id, context.dialect, records).await?
            }
            Fetched::PullRequests(records) => {
                upsert_pull_requests(&txn, repository.id, context.dialect, records).await?
            }
            Fetched::Workflows(records) => {
                upsert_workflow_runs(&txn, repository.id, context.dialect, records).await?
            }
        };
        mark_success(&txn, repository.id, kind, started_at.fixed_offset()).await?;
        txn.commit().await?;
        Ok(items)
    }

    async fn record_failure(
        &self,
        repository_id: i32,
        kind: ResourceKind,
        err: &EngineError,
    ) -> UnitOutcome {
        counter!(
            "sync_resource_failures_total",
            "resource" => kind.as_str(),
            "reason" => err.reason()
        )
        .increment(1);
        warn!(
            repository_id,
            resource = kind.as_str(),
            reason = err.reason(),
            error = %err.summary(),
            "Resource sync failed"
        );
        if let Err(db_err) = mark_failure(&*self.db, repository_id, kind, &err.failure_note()).await
        {
            error!(repository_id, resource = kind.as_str(), error = %db_err, "Failed to record sync failure");
        }
        UnitOutcome {
            repository_id,
            items: 0,
            failed: true,
        }
    }
}

enum Fetched {
    Issues(Vec<IssueRecord>),
    PullRequests(Vec<PullRequestRecord>),
    Workflows(Vec<WorkflowRunRecord>),
}

/// Follows `has_more` from page 1 up to `max_pages`.
async fn collect_pages<T, F, Fut>(
    max_pages: u32,
    per_page: u32,
    since: Option<chrono::DateTime<Utc>>,
    mut fetch: F,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, FetchError>>,
{
    let mut items = Vec::new();
    for page in 1..=max_pages {
        let batch = fetch(PageRequest {
            page,
            per_page,
            since,
        })
        .await?;
        items.extend(batch.items);
        if !batch.has_more {
            return Ok(items);
        }
    }
    info!(max_pages, "Page limit reached; remaining pages skipped");
    Ok(items)
}

fn aggregate(outcomes: &[UnitOutcome]) -> SyncCounts {
    let mut repositories: Vec<i32> = outcomes.iter().map(|o| o.repository_id).collect();
    repositories.sort_unstable();
    repositories.dedup();

    SyncCounts {
        items_synced: outcomes.iter().map(|o| o.items).sum::<u64>().min(i32::MAX as u64) as i32,
        repositories_synced: repositories.len() as i32,
        errors_count: outcomes.iter().filter(|o| o.failed).count() as i32,
    }
}

fn record_run(target: SyncTarget, outcome: &'static str, timer: Instant) {
    counter!("sync_runs_total", "scope" => target.scope(), "outcome" => outcome).increment(1);
    histogram!("sync_run_duration_ms").record(timer.elapsed().as_millis() as f64);
}
