//! In-memory version repository.

use super::model::VersionSnapshot;
use super::repository::VersionRepository;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Keeps histories in a process-local map. Used for sessions without durable
/// storage and in tests.
#[derive(Default)]
pub struct InMemoryVersionRepository {
    histories: Mutex<HashMap<String, Vec<VersionSnapshot>>>,
}

impl InMemoryVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionRepository for InMemoryVersionRepository {
    async fn load_history(&self, funnel_id: &str) -> Result<Vec<VersionSnapshot>> {
        Ok(self
            .histories
            .lock()
            .get(funnel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_history(&self, funnel_id: &str, snapshots: &[VersionSnapshot]) -> Result<()> {
        self.histories
            .lock()
            .insert(funnel_id.to_string(), snapshots.to_vec());
        Ok(())
    }

    async fn delete_history(&self, funnel_id: &str) -> Result<()> {
        self.histories.lock().remove(funnel_id);
        Ok(())
    }
}
