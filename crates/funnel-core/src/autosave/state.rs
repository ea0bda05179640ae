//! Observable autosave state.

use crate::error::FunnelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoSaveStatus {
    #[default]
    Idle,
    /// A debounce timer is armed.
    Pending,
    /// A save is in flight.
    Saving,
    /// Published once when a save settles, before returning to `Idle`.
    Saved,
    Error,
}

/// Snapshot of the scheduler, published to subscribers on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSaveState {
    pub status: AutoSaveStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<FunnelError>,
    /// Mutations exist that no save has captured yet.
    pub dirty: bool,
    /// The latest saved state has not reached the remote store (or local
    /// storage rejected it).
    pub unsynced: bool,
    pub enabled: bool,
    pub interval_ms: u64,
}

impl AutoSaveState {
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            status: AutoSaveStatus::Idle,
            last_saved_at: None,
            last_error: None,
            dirty: false,
            unsynced: false,
            enabled,
            interval_ms,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.status == AutoSaveStatus::Saving
    }
}
