//! Sync history ledger
//!
//! Append-only: a row is inserted as `started` and later finalized in place.
//! Nothing here deletes entries.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryOrder, QuerySelect,
    Set,
};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::models::sync_history::{self, Column, Entity as SyncHistory};

pub const STATUS_STARTED: &str = "started";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

pub const DEFAULT_HISTORY_LIMIT: u64 = 50;
pub const MAX_HISTORY_LIMIT: u64 = 500;

/// Totals recorded when a run is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub items_synced: i32,
    pub repositories_synced: i32,
    pub errors_count: i32,
}

#[derive(Debug, Clone)]
pub struct SyncHistoryRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncHistoryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn start(
        &self,
        scope: &str,
        target_id: Option<i32>,
        target_name: Option<String>,
    ) -> EngineResult<sync_history::Model> {
        Ok(sync_history::ActiveModel {
            scope: Set(scope.to_string()),
            target_id: Set(target_id),
            target_name: Set(target_name),
            status: Set(STATUS_STARTED.to_string()),
            error_message: Set(None),
            items_synced: Set(0),
            repositories_synced: Set(0),
            errors_count: Set(0),
            started_at: Set(Utc::now().fixed_offset()),
            completed_at: Set(None),
            duration_ms: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?)
    }

    /// Names the target once it has been resolved.
    pub async fn set_target_name(
        &self,
        entry: sync_history::Model,
        target_name: String,
    ) -> EngineResult<sync_history::Model> {
        let mut active = entry.into_active_model();
        active.target_name = Set(Some(target_name));
        Ok(active.update(&*self.db).await?)
    }

    pub async fn complete(
        &self,
        entry: sync_history::Model,
        counts: SyncCounts,
        error_message: Option<String>,
    ) -> EngineResult<sync_history::Model> {
        self.finalize(entry, STATUS_COMPLETED, counts, error_message)
            .await
    }

    pub async fn fail(
        &self,
        entry: sync_history::Model,
        error_message: String,
    ) -> EngineResult<sync_history::Model> {
        self.finalize(entry, STATUS_FAILED, SyncCounts::default(), Some(error_message))
            .await
    }

    async fn finalize(
        &self,
        entry: sync_history::Model,
        status: &str,
        counts: SyncCounts,
        error_message: Option<String>,
    ) -> EngineResult<sync_history::Model> {
        let completed_at = Utc::now().fixed_offset();
        let duration_ms = (completed_at - entry.started_at).num_milliseconds().max(0);

        let mut active = entry.into_active_model();
        active.status = Set(status.to_string());
        active.error_message = Set(error_message);
        active.items_synced = Set(counts.items_synced);
        active.repositories_synced = Set(counts.repositories_synced);
        active.errors_count = Set(counts.errors_count);
        active.completed_at = Set(Some(completed_at));
        active.duration_ms = Set(Some(duration_ms));
        Ok(active.update(&*self.db).await?)
    }

    pub async fn get(&self, id: i32) -> EngineResult<sync_history::Model> {
        SyncHistory::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| EngineError::not_found("sync history entry", id))
    }

    /// Newest first. `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
    pub async fn list(&self, limit: Option<u64>) -> EngineResult<Vec<sync_history::Model>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(SyncHistory::find()
            .order_by_desc(Column::StartedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
