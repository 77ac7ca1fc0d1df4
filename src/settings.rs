//! Runtime sync settings
//!
//! Seeded from configuration and held in memory. The auto-sync scheduler
//! reads them on every tick, so updates take effect without a restart.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use utoipa::ToSchema;

use crate::config::{MAX_SYNC_INTERVAL_MINUTES, SchedulerConfig};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SyncSettings {
    /// Minutes between automatic `sync all` runs (1 to 43200)
    pub sync_interval_minutes: u64,
    pub auto_sync_enabled: bool,
}

impl SyncSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if !(1..=MAX_SYNC_INTERVAL_MINUTES).contains(&self.sync_interval_minutes) {
            return Err(EngineError::Validation(format!(
                "sync_interval_minutes must be between 1 and {MAX_SYNC_INTERVAL_MINUTES}"
            )));
        }
        Ok(())
    }
}

impl From<&SchedulerConfig> for SyncSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            sync_interval_minutes: config
                .sync_interval_minutes
                .clamp(1, MAX_SYNC_INTERVAL_MINUTES),
            auto_sync_enabled: config.auto_sync_enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    inner: Arc<RwLock<SyncSettings>>,
}

impl SettingsStore {
    pub fn new(initial: SyncSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub async fn get(&self) -> SyncSettings {
        *self.inner.read().await
    }

    /// Replaces the settings after validating them.
    pub async fn update(&self, settings: SyncSettings) -> EngineResult<SyncSettings> {
        settings.validate()?;
        *self.inner.write().await = settings;
        info!(
            sync_interval_minutes = settings.sync_interval_minutes,
            auto_sync_enabled = settings.auto_sync_enabled,
            "Sync settings updated"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_replaces_settings() {
        let store = SettingsStore::new(SyncSettings::from(&SchedulerConfig::default()));
        assert_eq!(store.get().await.sync_interval_minutes, 30);

        let updated = store
            .update(SyncSettings {
                sync_interval_minutes: 5,
                auto_sync_enabled: false,
            })
            .await
            .unwrap();
        assert_eq!(store.get().await, updated);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected_and_keeps_previous() {
        let store = SettingsStore::new(SyncSettings {
            sync_interval_minutes: 15,
            auto_sync_enabled: true,
        });
        let err = store
            .update(SyncSettings {
                sync_interval_minutes: 0,
                auto_sync_enabled: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.get().await.sync_interval_minutes, 15);
    }

    #[tokio::test]
    async fn oversized_interval_is_rejected() {
        let store = SettingsStore::new(SyncSettings {
            sync_interval_minutes: 15,
            auto_sync_enabled: true,
        });
        for minutes in [MAX_SYNC_INTERVAL_MINUTES + 1, 1_000_000_000_000_000] {
            let err = store
                .update(SyncSettings {
                    sync_interval_minutes: minutes,
                    auto_sync_enabled: true,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
        assert_eq!(store.get().await.sync_interval_minutes, 15);

        store
            .update(SyncSettings {
                sync_interval_minutes: MAX_SYNC_INTERVAL_MINUTES,
                auto_sync_enabled: true,
            })
            .await
            .unwrap();
    }
}
