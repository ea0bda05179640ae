//! Bounded snapshot history.

use super::model::{HistorySummary, SnapshotLabel, VersionMeta, VersionSnapshot};
use super::repository::VersionRepository;
use crate::error::{FunnelError, Result};
use crate::funnel::{Funnel, new_id};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default number of snapshots kept per funnel.
pub const DEFAULT_MAX_ENTRIES: usize = 20;

/// Keeps an append-only, capped history of snapshots per funnel.
///
/// Histories are loaded from the repository on first access and cached.
/// Every append writes the whole list back. When the cap is exceeded the
/// oldest entries are dropped first; the entry just appended always survives.
pub struct VersionManager {
    repository: Arc<dyn VersionRepository>,
    max_entries: usize,
    cache: Mutex<HashMap<String, Vec<VersionSnapshot>>>,
}

impl VersionManager {
    /// Creates a manager. A cap of zero is raised to one.
    pub fn new(repository: Arc<dyn VersionRepository>, max_entries: usize) -> Self {
        Self {
            repository,
            max_entries: max_entries.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Appends a snapshot of `funnel` at its current version.
    pub async fn record(&self, funnel: &Funnel, label: SnapshotLabel) -> Result<VersionMeta> {
        let entry = VersionSnapshot {
            id: new_id(),
            funnel_id: funnel.id.clone(),
            version: funnel.version,
            snapshot: funnel.clone(),
            created_at: Utc::now(),
            label,
        };
        let meta = entry.meta();

        let mut cache = self.cache.lock().await;
        let mut entries = self.load_into(&mut cache, &funnel.id).await?.clone();
        entries.push(entry);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        self.repository.save_history(&funnel.id, &entries).await?;
        cache.insert(funnel.id.clone(), entries);

        tracing::debug!(
            "Recorded version {} of funnel {} ({})",
            meta.version,
            funnel.id,
            label
        );
        Ok(meta)
    }

    /// History metadata, newest first.
    pub async fn history(&self, funnel_id: &str) -> Result<Vec<VersionMeta>> {
        let mut cache = self.cache.lock().await;
        let entries = self.load_into(&mut cache, funnel_id).await?;
        Ok(entries.iter().rev().map(VersionSnapshot::meta).collect())
    }

    /// Fetches a full snapshot by its id.
    pub async fn snapshot(&self, funnel_id: &str, version_id: &str) -> Result<VersionSnapshot> {
        let mut cache = self.cache.lock().await;
        let entries = self.load_into(&mut cache, funnel_id).await?;
        entries
            .iter()
            .find(|e| e.id == version_id)
            .cloned()
            .ok_or_else(|| FunnelError::not_found("version", version_id))
    }

    /// Returns the snapshot payload to become the new in-memory state.
    ///
    /// History is not modified; the caller's next save appends a new entry.
    pub async fn restore_version(&self, funnel_id: &str, version_id: &str) -> Result<Funnel> {
        let entry = self.snapshot(funnel_id, version_id).await?;
        tracing::info!(
            "Restoring funnel {} to version {} ({})",
            funnel_id,
            entry.version,
            entry.id
        );
        Ok(entry.snapshot)
    }

    /// Highest version recorded for the funnel.
    pub async fn latest_version(&self, funnel_id: &str) -> Result<Option<u64>> {
        let mut cache = self.cache.lock().await;
        let entries = self.load_into(&mut cache, funnel_id).await?;
        Ok(entries.iter().map(|e| e.version).max())
    }

    pub async fn summary(&self, funnel_id: &str) -> Result<HistorySummary> {
        let mut cache = self.cache.lock().await;
        let entries = self.load_into(&mut cache, funnel_id).await?;
        Ok(HistorySummary {
            total_entries: entries.len(),
            latest_version: entries.iter().map(|e| e.version).max(),
            last_modified: entries.iter().map(|e| e.created_at).max(),
        })
    }

    /// Drops every snapshot of the funnel.
    pub async fn clear_history(&self, funnel_id: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        self.repository.delete_history(funnel_id).await?;
        cache.insert(funnel_id.to_string(), Vec::new());
        tracing::info!("Cleared version history of funnel {}", funnel_id);
        Ok(())
    }

    async fn load_into<'a>(
        &self,
        cache: &'a mut HashMap<String, Vec<VersionSnapshot>>,
        funnel_id: &str,
    ) -> Result<&'a Vec<VersionSnapshot>> {
        if !cache.contains_key(funnel_id) {
            let loaded = self.repository.load_history(funnel_id).await?;
            cache.insert(funnel_id.to_string(), loaded);
        }
        cache
            .get(funnel_id)
            .ok_or_else(|| FunnelError::internal("history cache entry vanished"))
    }
}
