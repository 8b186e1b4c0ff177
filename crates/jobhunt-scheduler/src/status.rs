//! Scrape status register shared by the poller and status readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Last known state of the ingestion loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeStatus {
    /// A cycle is in progress
    pub running: bool,
    /// When the latest cycle started
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the latest successful cycle finished
    pub last_ok_at: Option<DateTime<Utc>>,
    /// Error of the latest cycle, cleared on success
    pub last_error: Option<String>,
    /// Rows added by the latest cycle
    pub last_added: usize,
}

/// Shared handle to the current [`ScrapeStatus`].
///
/// Writers replace the whole snapshot; readers always see a consistent one.
#[derive(Debug, Clone, Default)]
pub struct StatusRegister {
    current: Arc<RwLock<Arc<ScrapeStatus>>>,
}

impl StatusRegister {
    /// Register with an idle status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ScrapeStatus> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Mark a cycle as started at `now`.
    ///
    /// Returns `false` without changing anything if a cycle is already
    /// running.
    pub fn try_begin(&self, now: DateTime<Utc>) -> bool {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if guard.running {
            return false;
        }
        let mut next = ScrapeStatus::clone(&guard);
        next.running = true;
        next.last_run_at = Some(now);
        *guard = Arc::new(next);
        true
    }

    /// Record the end of a cycle.
    pub fn finish(&self, now: DateTime<Utc>, outcome: Result<usize, String>) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = ScrapeStatus::clone(&guard);
        next.running = false;
        match outcome {
            Ok(added) => {
                next.last_added = added;
                next.last_error = None;
                next.last_ok_at = Some(now);
            }
            Err(error) => {
                next.last_added = 0;
                next.last_error = Some(error);
            }
        }
        *guard = Arc::new(next);
    }
}
