//! File-based version history store: `{data_dir}/history/{funnel_id}.json`.

use async_trait::async_trait;
use funnel_core::error::Result;
use funnel_core::version::{VersionRepository, VersionSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use version_migrate::Migrator;

use crate::dto::{VersionHistory, create_version_history_migrator};
use crate::paths::{FunnelPaths, record_path};
use crate::storage::{AtomicJsonFile, run_blocking};

pub struct FileVersionRepository {
    dir: PathBuf,
    migrator: Arc<Migrator>,
}

impl FileVersionRepository {
    pub fn new(paths: &FunnelPaths) -> Result<Self> {
        Self::with_dir(paths.history_dir())
    }

    pub fn with_dir(dir: PathBuf) -> Result<Self> {
        Ok(Self {
            dir,
            migrator: Arc::new(create_version_history_migrator()?),
        })
    }
}

#[async_trait]
impl VersionRepository for FileVersionRepository {
    async fn load_history(&self, funnel_id: &str) -> Result<Vec<VersionSnapshot>> {
        let path = record_path(&self.dir, funnel_id)?;
        let value = run_blocking(move || AtomicJsonFile::new(path).load()).await?;

        match value {
            Some(value) => {
                let history: VersionHistory =
                    self.migrator.load_flat_from("version_history", value)?;
                Ok(history.snapshots)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save_history(&self, funnel_id: &str, snapshots: &[VersionSnapshot]) -> Result<()> {
        let path = record_path(&self.dir, funnel_id)?;
        let history = VersionHistory {
            funnel_id: funnel_id.to_string(),
            snapshots: snapshots.to_vec(),
        };
        let serialized = self.migrator.save_domain_flat("version_history", history)?;

        run_blocking(move || AtomicJsonFile::new(path).save(&serialized)).await
    }

    async fn delete_history(&self, funnel_id: &str) -> Result<()> {
        let path = record_path(&self.dir, funnel_id)?;
        run_blocking(move || AtomicJsonFile::new(path).remove()).await
    }
}
