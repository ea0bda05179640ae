//! In-memory local store with a byte quota.

use super::repository::LocalFunnelRepository;
use crate::error::{FunnelError, Result};
use crate::funnel::Funnel;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Keeps serialized documents in memory and enforces a total byte quota, the
/// way a browser-style key/value store would.
pub struct InMemoryFunnelRepository {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
    quota_bytes: u64,
}

impl InMemoryFunnelRepository {
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            quota_bytes,
        }
    }

    /// Bytes currently stored.
    pub fn used_bytes(&self) -> u64 {
        self.records.lock().values().map(|r| r.len() as u64).sum()
    }
}

#[async_trait]
impl LocalFunnelRepository for InMemoryFunnelRepository {
    async fn write(&self, funnel: &Funnel) -> Result<()> {
        let bytes = serde_json::to_vec(funnel)?;

        let mut records = self.records.lock();
        let others: u64 = records
            .iter()
            .filter(|(id, _)| id.as_str() != funnel.id)
            .map(|(_, r)| r.len() as u64)
            .sum();
        let needed = others + bytes.len() as u64;
        if needed > self.quota_bytes {
            return Err(FunnelError::StorageFull {
                needed,
                quota: self.quota_bytes,
            });
        }

        records.insert(funnel.id.clone(), bytes);
        Ok(())
    }

    async fn read(&self, funnel_id: &str) -> Result<Option<Funnel>> {
        let records = self.records.lock();
        match records.get(funnel_id) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, funnel_id: &str) -> Result<()> {
        self.records.lock().remove(funnel_id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::default_funnel;

    #[tokio::test]
    async fn test_write_read_delete() {
        let repo = InMemoryFunnelRepository::new(1024 * 1024);
        let funnel = default_funnel("Local");

        repo.write(&funnel).await.unwrap();
        assert_eq!(repo.read(&funnel.id).await.unwrap(), Some(funnel.clone()));
        assert_eq!(repo.list_ids().await.unwrap(), vec![funnel.id.clone()]);

        repo.delete(&funnel.id).await.unwrap();
        assert_eq!(repo.read(&funnel.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quota_exceeded_keeps_previous_record() {
        let funnel = default_funnel("Quota");
        let size = serde_json::to_vec(&funnel).unwrap().len() as u64;
        let repo = InMemoryFunnelRepository::new(size + 16);
        repo.write(&funnel).await.unwrap();

        let mut bigger = funnel.clone();
        bigger.name = "x".repeat(64);
        let err = repo.write(&bigger).await.unwrap_err();

        assert!(err.is_storage_full());
        assert_eq!(repo.read(&funnel.id).await.unwrap().unwrap().name, "Quota");
    }

    #[tokio::test]
    async fn test_overwrite_does_not_count_old_record() {
        let funnel = default_funnel("Same");
        let size = serde_json::to_vec(&funnel).unwrap().len() as u64;
        let repo = InMemoryFunnelRepository::new(size);

        repo.write(&funnel).await.unwrap();
        repo.write(&funnel).await.unwrap();
        assert_eq!(repo.used_bytes(), size);
    }
}
