//! Process-wide single-flight lock for sync runs.
//!
//! [`SyncLock::try_acquire`] never waits: it hands out a [`SyncLockGuard`] or
//! fails with [`EngineError::AlreadyInProgress`]. Dropping the guard releases
//! the lock on every exit path, unwinding included. Each acquisition carries
//! a fresh token so a guard outliving a [`SyncLock::force_release`] cannot
//! release somebody else's run.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::sync_orchestrator::SyncTarget;

/// Who holds the lock and since when.
#[derive(Debug, Clone, PartialEq)]
pub struct LockHolder {
    token: Uuid,
    pub target: SyncTarget,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncLock {
    state: Arc<Mutex<Option<LockHolder>>>,
}

impl SyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections are single assignments; a poisoned state is intact.
    fn state(&self) -> MutexGuard<'_, Option<LockHolder>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn try_acquire(&self, target: SyncTarget) -> Result<SyncLockGuard, EngineError> {
        let mut state = self.state();
        if let Some(holder) = state.as_ref() {
            debug!(held_by = ?holder.target, requested = ?target, "Sync lock busy");
            return Err(EngineError::AlreadyInProgress);
        }
        let token = Uuid::new_v4();
        *state = Some(LockHolder {
            token,
            target,
            acquired_at: Utc::now(),
        });
        Ok(SyncLockGuard {
            lock: self.clone(),
            token,
        })
    }

    pub fn is_held(&self) -> bool {
        self.state().is_some()
    }

    pub fn holder(&self) -> Option<LockHolder> {
        self.state().clone()
    }

    /// Clears the lock regardless of owner. Returns whether it was held.
    pub fn force_release(&self) -> bool {
        let previous = self.state().take();
        if let Some(holder) = &previous {
            warn!(
                target_scope = holder.target.scope(),
                acquired_at = %holder.acquired_at,
                "Sync lock force-released"
            );
        }
        previous.is_some()
    }

    fn release(&self, token: Uuid) {
        let mut state = self.state();
        if state.as_ref().is_some_and(|h| h.token == token) {
            *state = None;
        }
    }
}

/// Scoped ownership of the [`SyncLock`].
#[derive(Debug)]
pub struct SyncLockGuard {
    lock: SyncLock,
    token: Uuid,
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.lock.release(self.token);
    }
}
