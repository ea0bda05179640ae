//! Editor configuration file storage.
//!
//! Reads `config.toml` into a `serde_json::Value` and only then into
//! `EditorConfig`, so the TOML layer stays independent of the config type.

use super::atomic_json::write_atomically;
use funnel_core::config::EditorConfig;
use funnel_core::error::{FunnelError, Result};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::PathBuf;

pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the file as JSON.
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

        let toml_value: toml::Value = toml::from_str(&content)?;
        Ok(Some(toml_to_json(toml_value)?))
    }

    /// Loads the editor configuration, falling back to defaults when the file
    /// does not exist.
    pub fn load_config(&self) -> Result<EditorConfig> {
        match self.load()? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| FunnelError::config(format!("Invalid editor config: {}", e))),
            None => Ok(EditorConfig::default()),
        }
    }

    pub fn save_config(&self, config: &EditorConfig) -> Result<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| FunnelError::config(format!("Failed to serialize config: {}", e)))?;
        write_atomically(&self.path, toml_string.as_bytes())
    }
}

fn toml_to_json(toml_value: toml::Value) -> Result<JsonValue> {
    let json_str = serde_json::to_string(&toml_value)?;
    Ok(serde_json::from_str(&json_str)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().join("config.toml"));

        assert_eq!(storage.load_config().unwrap(), EditorConfig::default());
    }

    #[test]
    fn test_partial_file_is_merged_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[autosave]
enabled = false

[storage]
quota_bytes = 1024
"#,
        )
        .unwrap();

        let config = ConfigStorage::new(path).load_config().unwrap();
        assert!(!config.autosave.enabled);
        assert_eq!(config.autosave.debounce_ms, 10_000);
        assert_eq!(config.storage.quota_bytes, 1024);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ConfigStorage::new(temp_dir.path().join("config.toml"));
        let mut config = EditorConfig::default();
        config.history.max_entries = 7;

        storage.save_config(&config).unwrap();

        assert_eq!(storage.load_config().unwrap(), config);
    }

    #[test]
    fn test_invalid_value_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[autosave]\ndebounce_ms = \"soon\"\n").unwrap();

        let err = ConfigStorage::new(path).load_config().unwrap_err();
        assert!(matches!(err, FunnelError::Config(_)));
    }
}
