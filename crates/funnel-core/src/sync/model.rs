//! Sync value types.

use serde::{Deserialize, Serialize};

/// Outcome of draining the offline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Entries the remote accepted, including duplicates it already held.
    pub synced: usize,
    /// Entries that could not be pushed and stay queued.
    pub failed: usize,
    /// Entries dropped because the remote held a newer version.
    pub conflicts: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.conflicts == 0
    }
}

/// Host connectivity as reported by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}
