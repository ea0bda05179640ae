//! File-based local funnel store.
//!
//! Stores one versioned JSON record per funnel in
//! `{data_dir}/funnels/{funnel_id}.json`, bounded by a byte quota over the
//! whole directory. The quota check and the write run under one directory
//! lock.

use async_trait::async_trait;
use funnel_core::error::{FunnelError, Result};
use funnel_core::funnel::Funnel;
use funnel_core::persistence::LocalFunnelRepository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use version_migrate::Migrator;

use crate::dto::create_funnel_record_migrator;
use crate::paths::{FunnelPaths, record_path};
use crate::storage::{AtomicJsonFile, FileLock, run_blocking};

pub struct FileFunnelRepository {
    dir: PathBuf,
    quota_bytes: u64,
    migrator: Arc<Migrator>,
}

impl FileFunnelRepository {
    pub fn new(paths: &FunnelPaths, quota_bytes: u64) -> Result<Self> {
        Self::with_dir(paths.funnels_dir(), quota_bytes)
    }

    /// Creates a repository rooted at `dir` (for testing).
    pub fn with_dir(dir: PathBuf, quota_bytes: u64) -> Result<Self> {
        Ok(Self {
            dir,
            quota_bytes,
            migrator: Arc::new(create_funnel_record_migrator()?),
        })
    }
}

/// Total size of the records in `dir`, excluding `skip`.
fn used_bytes(dir: &Path, skip: &Path) -> Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path == skip || !is_record(&path) {
            continue;
        }
        total += std::fs::metadata(&path)?.len();
    }
    Ok(total)
}

fn is_record(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
        && !path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

#[async_trait]
impl LocalFunnelRepository for FileFunnelRepository {
    async fn write(&self, funnel: &Funnel) -> Result<()> {
        let path = record_path(&self.dir, &funnel.id)?;
        let serialized = self
            .migrator
            .save_domain_flat("funnel_record", funnel.clone())?;

        let dir = self.dir.clone();
        let quota = self.quota_bytes;
        run_blocking(move || {
            // Writers of other ids must not slip in between the check and the write.
            let _quota = FileLock::acquire_dir(&dir, "quota")?;
            let needed = used_bytes(&dir, &path)? + serialized.len() as u64;
            if needed > quota {
                return Err(FunnelError::StorageFull { needed, quota });
            }
            AtomicJsonFile::new(path).save(&serialized)
        })
        .await?;

        tracing::debug!("Wrote local record of funnel {} (v{})", funnel.id, funnel.version);
        Ok(())
    }

    async fn read(&self, funnel_id: &str) -> Result<Option<Funnel>> {
        let path = record_path(&self.dir, funnel_id)?;
        let value = run_blocking(move || AtomicJsonFile::new(path).load()).await?;

        match value {
            Some(value) => Ok(Some(self.migrator.load_flat_from("funnel_record", value)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, funnel_id: &str) -> Result<()> {
        let path = record_path(&self.dir, funnel_id)?;
        run_blocking(move || AtomicJsonFile::new(path).remove()).await
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        run_blocking(move || {
            if !dir.exists() {
                return Ok(Vec::new());
            }
            let mut ids = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if !is_record(&path) {
                    continue;
                }
                if let Some(stem) = path.file_stem() {
                    ids.push(stem.to_string_lossy().into_owned());
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::funnel::default_funnel;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), 1 << 20).unwrap();
        let funnel = default_funnel("On disk");

        repo.write(&funnel).await.unwrap();

        let loaded = repo.read(&funnel.id).await.unwrap().unwrap();
        assert_eq!(loaded, funnel);
        assert_eq!(repo.list_ids().await.unwrap(), vec![funnel.id.clone()]);
    }

    #[tokio::test]
    async fn test_record_carries_schema_version() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), 1 << 20).unwrap();
        let funnel = default_funnel("Schema");

        repo.write(&funnel).await.unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join(format!("{}.json", funnel.id))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], "1.1.0");
        assert_eq!(value["funnelId"], funnel.id.as_str());
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), 1 << 20).unwrap();
        assert!(repo.read("unknown").await.unwrap().is_none());
        assert!(repo.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_rejects_write_and_keeps_old_record() {
        let temp_dir = TempDir::new().unwrap();
        let funnel = default_funnel("Small");
        let repo = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), 1 << 20).unwrap();
        repo.write(&funnel).await.unwrap();
        let size = std::fs::metadata(temp_dir.path().join(format!("{}.json", funnel.id)))
            .unwrap()
            .len();

        let tight = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), size + 8).unwrap();
        let mut bigger = funnel.clone();
        bigger.name = "y".repeat(256);
        let err = tight.write(&bigger).await.unwrap_err();

        assert!(err.is_storage_full());
        assert_eq!(tight.read(&funnel.id).await.unwrap().unwrap().name, "Small");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_of_different_funnels_respect_quota() {
        let temp_dir = TempDir::new().unwrap();
        let sample = default_funnel("Sizing");
        let sizing = FileFunnelRepository::with_dir(temp_dir.path().join("sizing"), 1 << 20).unwrap();
        sizing.write(&sample).await.unwrap();
        let size = std::fs::metadata(temp_dir.path().join("sizing").join(format!("{}.json", sample.id)))
            .unwrap()
            .len();

        // Room for exactly one record of this shape.
        let dir = temp_dir.path().join("funnels");
        let repo = Arc::new(FileFunnelRepository::with_dir(dir.clone(), size + size / 2).unwrap());
        let writes: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                let funnel = default_funnel("Sizing");
                tokio::spawn(async move { (i, repo.write(&funnel).await) })
            })
            .collect();

        let mut stored = 0;
        for write in writes {
            match write.await.unwrap() {
                (_, Ok(())) => stored += 1,
                (i, Err(e)) => assert!(e.is_storage_full(), "write {} failed: {}", i, e),
            }
        }

        assert_eq!(stored, 1);
        assert_eq!(repo.list_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), 1 << 20).unwrap();
        let funnel = default_funnel("Doomed");
        repo.write(&funnel).await.unwrap();

        repo.delete(&funnel.id).await.unwrap();
        repo.delete(&funnel.id).await.unwrap();

        assert!(repo.read(&funnel.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileFunnelRepository::with_dir(temp_dir.path().to_path_buf(), 1 << 20).unwrap();
        let err = repo.read("../escape").await.unwrap_err();
        assert!(matches!(err, FunnelError::Validation(_)));
    }
}
