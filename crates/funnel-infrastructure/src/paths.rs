//! Path management for editor storage.
//!
//! Paths resolve through `AppPaths` from version-migrate unless a base
//! directory is configured explicitly.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/funnel-editor/     # Config directory
//! └── config.toml              # Editor configuration
//!
//! ~/.local/share/funnel-editor/   # Data directory (or storage.base_dir)
//! ├── funnels/                    # One record per funnel: {funnel_id}.json
//! ├── history/                    # Snapshot history: {funnel_id}.json
//! └── sync_queue.json             # Offline push queue
//! ```

use funnel_core::error::{FunnelError, Result};
use std::path::{Path, PathBuf};
use version_migrate::AppPaths;

const APP_NAME: &str = "funnel-editor";

#[derive(Debug, Clone)]
pub struct FunnelPaths {
    data_dir: PathBuf,
}

impl FunnelPaths {
    /// Resolves the data directory. `base_dir` overrides the platform default.
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match base_dir {
            Some(dir) => dir,
            None => AppPaths::new(APP_NAME)
                .data_dir()
                .map_err(|e| FunnelError::config(format!("Cannot resolve data directory: {}", e)))?,
        };
        Ok(Self { data_dir })
    }

    /// Returns the path of the editor configuration file.
    pub fn config_file() -> Result<PathBuf> {
        let dir = AppPaths::new(APP_NAME)
            .config_dir()
            .map_err(|e| FunnelError::config(format!("Cannot resolve config directory: {}", e)))?;
        Ok(dir.join("config.toml"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn funnels_dir(&self) -> PathBuf {
        self.data_dir.join("funnels")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    pub fn sync_queue_file(&self) -> PathBuf {
        self.data_dir.join("sync_queue.json")
    }
}

/// Path of the JSON record for `id` inside `dir`.
///
/// Ids become file names, so anything besides ASCII alphanumerics, `-` and
/// `_` is rejected.
pub(crate) fn record_path(dir: &Path, id: &str) -> Result<PathBuf> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(FunnelError::validation(format!(
            "'{}' cannot be used as a storage key",
            id
        )));
    }
    Ok(dir.join(format!("{}.json", id)))
}
