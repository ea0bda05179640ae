//! Version history DTOs.

use funnel_core::error::Result;
use funnel_core::version::VersionSnapshot;
use serde::{Deserialize, Serialize};
use version_migrate::{IntoDomain, Migrator, Versioned};

/// Snapshot history of one funnel as it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistory {
    pub funnel_id: String,
    pub snapshots: Vec<VersionSnapshot>,
}

/// Version history V1.0.0.
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
#[serde(rename_all = "camelCase")]
pub struct VersionHistoryV1_0_0 {
    pub funnel_id: String,
    #[serde(default)]
    pub snapshots: Vec<VersionSnapshot>,
}

impl IntoDomain<VersionHistory> for VersionHistoryV1_0_0 {
    fn into_domain(self) -> VersionHistory {
        VersionHistory {
            funnel_id: self.funnel_id,
            snapshots: self.snapshots,
        }
    }
}

impl version_migrate::FromDomain<VersionHistory> for VersionHistoryV1_0_0 {
    fn from_domain(history: VersionHistory) -> Self {
        VersionHistoryV1_0_0 {
            funnel_id: history.funnel_id,
            snapshots: history.snapshots,
        }
    }
}

pub fn create_version_history_migrator() -> Result<Migrator> {
    let mut migrator = Migrator::builder().build();

    let path = Migrator::define("version_history")
        .from::<VersionHistoryV1_0_0>()
        .into_with_save::<VersionHistory>();

    migrator.register(path)?;
    Ok(migrator)
}
