//! Version history model.

use crate::funnel::Funnel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a snapshot was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotLabel {
    #[default]
    Autosave,
    Manual,
    /// Local state set aside when the remote copy won a conflict.
    ConflictBackup,
}

impl SnapshotLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Autosave => "autosave",
            Self::Manual => "manual",
            Self::ConflictBackup => "conflict-backup",
        }
    }
}

impl std::fmt::Display for SnapshotLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full, immutable copy of a funnel at a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub id: String,
    pub funnel_id: String,
    pub version: u64,
    pub snapshot: Funnel,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub label: SnapshotLabel,
}

impl VersionSnapshot {
    pub fn meta(&self) -> VersionMeta {
        VersionMeta {
            id: self.id.clone(),
            version: self.version,
            created_at: self.created_at,
            label: self.label,
        }
    }
}

/// History entry without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub id: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub label: SnapshotLabel,
}

/// Aggregate view of a funnel's history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_entries: usize,
    pub latest_version: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}
