//! Offline sync queue DTOs.

use funnel_core::error::Result;
use funnel_core::sync::PendingPush;
use serde::{Deserialize, Serialize};
use version_migrate::{IntoDomain, Migrator, Versioned};

/// The persisted offline queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncQueue {
    pub entries: Vec<PendingPush>,
}

/// Sync queue V1.0.0.
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct SyncQueueV1_0_0 {
    #[serde(default)]
    pub entries: Vec<PendingPush>,
}

impl IntoDomain<SyncQueue> for SyncQueueV1_0_0 {
    fn into_domain(self) -> SyncQueue {
        SyncQueue {
            entries: self.entries,
        }
    }
}

impl version_migrate::FromDomain<SyncQueue> for SyncQueueV1_0_0 {
    fn from_domain(queue: SyncQueue) -> Self {
        SyncQueueV1_0_0 {
            entries: queue.entries,
        }
    }
}

pub fn create_sync_queue_migrator() -> Result<Migrator> {
    let mut migrator = Migrator::builder().build();

    let path = Migrator::define("sync_queue")
        .from::<SyncQueueV1_0_0>()
        .into_with_save::<SyncQueue>();

    migrator.register(path)?;
    Ok(migrator)
}
