//! File-based offline queue: `{data_dir}/sync_queue.json`.

use async_trait::async_trait;
use funnel_core::error::Result;
use funnel_core::sync::{PendingPush, SyncQueueRepository};
use std::path::PathBuf;
use std::sync::Arc;
use version_migrate::Migrator;

use crate::dto::{SyncQueue, create_sync_queue_migrator};
use crate::paths::FunnelPaths;
use crate::storage::{AtomicJsonFile, run_blocking};

pub struct FileSyncQueueRepository {
    path: PathBuf,
    migrator: Arc<Migrator>,
}

impl FileSyncQueueRepository {
    pub fn new(paths: &FunnelPaths) -> Result<Self> {
        Self::with_file(paths.sync_queue_file())
    }

    pub fn with_file(path: PathBuf) -> Result<Self> {
        Ok(Self {
            path,
            migrator: Arc::new(create_sync_queue_migrator()?),
        })
    }
}

#[async_trait]
impl SyncQueueRepository for FileSyncQueueRepository {
    async fn load_queue(&self) -> Result<Vec<PendingPush>> {
        let path = self.path.clone();
        let value = run_blocking(move || AtomicJsonFile::new(path).load()).await?;

        match value {
            Some(value) => {
                let queue: SyncQueue = self.migrator.load_flat_from("sync_queue", value)?;
                Ok(queue.entries)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save_queue(&self, entries: &[PendingPush]) -> Result<()> {
        let path = self.path.clone();
        if entries.is_empty() {
            return run_blocking(move || AtomicJsonFile::new(path).remove()).await;
        }

        let queue = SyncQueue {
            entries: entries.to_vec(),
        };
        let serialized = self.migrator.save_domain_flat("sync_queue", queue)?;
        run_blocking(move || AtomicJsonFile::new(path).save(&serialized)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::funnel::default_funnel;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync_queue.json");
        let mut funnel = default_funnel("Queued");
        funnel.version = 4;

        FileSyncQueueRepository::with_file(path.clone())
            .unwrap()
            .save_queue(&[PendingPush::new(funnel.clone())])
            .await
            .unwrap();

        let reopened = FileSyncQueueRepository::with_file(path).unwrap();
        let entries = reopened.load_queue().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].funnel_id, funnel.id);
        assert_eq!(entries[0].version, 4);
    }

    #[tokio::test]
    async fn test_empty_queue_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sync_queue.json");
        let repo = FileSyncQueueRepository::with_file(path.clone()).unwrap();
        repo.save_queue(&[PendingPush::new(default_funnel("x"))])
            .await
            .unwrap();

        repo.save_queue(&[]).await.unwrap();

        assert!(!path.exists());
        assert!(repo.load_queue().await.unwrap().is_empty());
    }
}
