//! # Auto-sync Scheduler
//!
//! Background task that triggers `sync all` whenever the configured interval
//! (plus a random jitter) has elapsed since the last automatic run. A run
//! already in progress is not an error: the tick is skipped and the next one
//! tries again.

use chrono::{DateTime, Duration, Utc};
use metrics::histogram;
use rand::Rng;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::SchedulerConfig;
use crate::error::EngineError;
use crate::settings::SettingsStore;
use crate::sync_orchestrator::SyncOrchestrator;

pub struct AutoSyncScheduler {
    orchestrator: SyncOrchestrator,
    settings: SettingsStore,
    tick_interval: TokioDuration,
    jitter_pct: f64,
    last_run: Option<DateTime<Utc>>,
    jitter: Duration,
}

impl AutoSyncScheduler {
    pub fn new(
        orchestrator: SyncOrchestrator,
        settings: SettingsStore,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            tick_interval: TokioDuration::from_secs(config.tick_interval_seconds.max(1)),
            jitter_pct: config.jitter_pct,
            last_run: None,
            jitter: Duration::zero(),
        }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.tick_interval.as_secs(),
            "Starting auto-sync scheduler"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Auto-sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(self.tick_interval) => {
                    let tick_started = Instant::now();
                    self.tick(Utc::now()).await;
                    histogram!("scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Auto-sync scheduler stopped");
    }

    async fn tick(&mut self, now: DateTime<Utc>) {
        let settings = self.settings.get().await;
        if !settings.auto_sync_enabled {
            debug!("Auto-sync disabled; tick skipped");
            return;
        }

        let Some(interval) = sync_interval(settings.sync_interval_minutes) else {
            error!(
                sync_interval_minutes = settings.sync_interval_minutes,
                "Sync interval out of range; tick skipped"
            );
            return;
        };
        if !is_due(self.last_run, now, interval, self.jitter) {
            return;
        }

        match self.orchestrator.sync_all().await {
            Ok(entry) => info!(
                history_id = entry.id,
                errors = entry.errors_count,
                "Automatic sync finished"
            ),
            Err(EngineError::AlreadyInProgress) => {
                debug!("Sync already in progress; automatic run skipped");
                return;
            }
            Err(err) => error!(error = %err, "Automatic sync failed"),
        }

        self.last_run = Some(now);
        let jitter_secs = compute_jitter_seconds(
            self.jitter_pct,
            interval.num_seconds().max(0) as u64,
            &mut rand::thread_rng(),
        );
        self.jitter = Duration::seconds(jitter_secs as i64);
    }
}

/// `None` when the minutes do not fit a [`Duration`].
pub fn sync_interval(minutes: u64) -> Option<Duration> {
    i64::try_from(minutes).ok().and_then(Duration::try_minutes)
}

/// A run is due when none happened yet or `interval + jitter` has elapsed.
/// A deadline past the representable range is never due.
pub fn is_due(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
    jitter: Duration,
) -> bool {
    match last_run {
        None => true,
        Some(last) => interval
            .checked_add(&jitter)
            .and_then(|wait| last.checked_add_signed(wait))
            .is_some_and(|due| now >= due),
    }
}

/// Uniform jitter in `0..=jitter_pct` of the interval, in whole seconds.
pub fn compute_jitter_seconds<R: Rng + ?Sized>(
    jitter_pct: f64,
    interval_seconds: u64,
    rng: &mut R,
) -> u64 {
    let pct = jitter_pct.clamp(0.0, 1.0);
    if pct == 0.0 {
        return 0;
    }
    (interval_seconds as f64 * rng.gen_range(0.0..=pct)).round() as u64
}
