//! Atomic JSON file operations.
//!
//! Writes go to a temporary file in the same directory, are fsynced, then
//! renamed over the target, so a reader sees either the old or the new
//! content. Writers are serialized with an fs2 lock file.

use funnel_core::error::{FunnelError, Result};
use serde_json::Value as JsonValue;
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

/// A handle to a JSON file that is always replaced whole.
pub struct AtomicJsonFile {
    path: PathBuf,
}

impl AtomicJsonFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file as a JSON value.
    ///
    /// - `Ok(Some(value))`: file parsed
    /// - `Ok(None)`: file missing or empty
    pub fn load(&self) -> Result<Option<JsonValue>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Replaces the file content under an exclusive lock.
    pub fn save(&self, content: &str) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        write_atomically(&self.path, content.as_bytes())
    }

    /// Deletes the file. A missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        let _lock = FileLock::acquire(&self.path)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes `bytes` to `path` through a temporary file and an atomic rename.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path(path)?;
    let written = (|| -> std::io::Result<()> {
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(bytes)?;
        tmp_file.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| FunnelError::io("Path has no parent directory"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| FunnelError::io("Path has no file name"))?;

    Ok(parent.join(format!(".{}.tmp", file_name.to_string_lossy())))
}

/// Exclusive lock guard. A per-file lock file is removed on drop; a
/// directory lock file stays, so every locker contends on the same inode.
pub(crate) struct FileLock {
    #[allow(dead_code)]
    file: File,
    lock_path: Option<PathBuf>,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");
        let file = Self::lock_file(&lock_path)?;
        Ok(FileLock {
            file,
            lock_path: Some(lock_path),
        })
    }

    /// Locks `dir` as a whole through `dir/.{name}.lock`.
    pub(crate) fn acquire_dir(dir: &Path, name: &str) -> Result<Self> {
        let file = Self::lock_file(&dir.join(format!(".{}.lock", name)))?;
        Ok(FileLock {
            file,
            lock_path: None,
        })
    }

    fn lock_file(lock_path: &Path) -> Result<File> {
        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| FunnelError::io(format!("Failed to acquire lock: {}", e)))?;
        }

        Ok(file)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(lock_path) = &self.lock_path {
            let _ = fs::remove_file(lock_path);
        }
    }
}

/// Runs blocking file work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FunnelError::internal(format!("Failed to join task: {}", e)))?
}
