//! Editor configuration.
//!
//! Every field has a default so that a partial (or absent) `config.toml`
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct EditorConfig {
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub enabled: bool,
    /// Quiet period after the first mutation before an automatic save.
    pub debounce_ms: u64,
    /// First retry delay after a failed automatic save.
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 10_000,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
        }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: crate::version::DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between coming back online and the sync pass it triggers.
    pub online_debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            online_debounce_ms: 1_500,
        }
    }
}

impl SyncConfig {
    pub fn online_debounce(&self) -> Duration {
        Duration::from_millis(self.online_debounce_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub quota_bytes: u64,
    /// Overrides the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 5 * 1024 * 1024,
            base_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EditorConfig = toml::from_str(
            r#"
[autosave]
debounce_ms = 500

[history]
max_entries = 5
"#,
        )
        .unwrap();

        assert!(config.autosave.enabled);
        assert_eq!(config.autosave.debounce(), Duration::from_millis(500));
        assert_eq!(config.autosave.backoff_base_ms, 2_000);
        assert_eq!(config.history.max_entries, 5);
        assert_eq!(config.sync.online_debounce_ms, 1_500);
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
        assert!(config.storage.base_dir.is_none());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: EditorConfig = toml::from_str("").unwrap();
        assert_eq!(config, EditorConfig::default());
    }
}
