//! In-memory remote store and queue repository.

use super::queue::{PendingPush, SyncQueueRepository};
use super::remote::RemoteFunnelStore;
use crate::error::{FunnelError, Result};
use crate::funnel::Funnel;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A process-local stand-in for the remote backend.
///
/// Reachability can be toggled to simulate network loss. Version checks
/// follow the `RemoteFunnelStore` contract.
pub struct InMemoryRemoteStore {
    funnels: Mutex<HashMap<String, Funnel>>,
    reachable: AtomicBool,
    accepted: AtomicUsize,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self {
            funnels: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            accepted: AtomicUsize::new(0),
        }
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of writes the store accepted.
    pub fn accepted_writes(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Current remote copy of a funnel.
    pub fn stored(&self, funnel_id: &str) -> Option<Funnel> {
        self.funnels.lock().get(funnel_id).cloned()
    }

    /// Seeds a remote copy directly, bypassing version checks.
    pub fn insert(&self, funnel: Funnel) {
        self.funnels.lock().insert(funnel.id.clone(), funnel);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FunnelError::network("remote store unreachable"))
        }
    }
}

#[async_trait]
impl RemoteFunnelStore for InMemoryRemoteStore {
    async fn load_funnel(&self, funnel_id: &str) -> Result<Funnel> {
        self.ensure_reachable()?;
        self.stored(funnel_id)
            .ok_or_else(|| FunnelError::not_found("funnel", funnel_id))
    }

    async fn create_funnel(&self, funnel: &Funnel) -> Result<Funnel> {
        self.ensure_reachable()?;
        let mut funnels = self.funnels.lock();
        if let Some(existing) = funnels.get(&funnel.id) {
            return Err(FunnelError::VersionConflict {
                local_version: funnel.version,
                remote_version: existing.version,
            });
        }
        funnels.insert(funnel.id.clone(), funnel.clone());
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(funnel.clone())
    }

    async fn save_funnel(&self, funnel: &Funnel, _is_auto_save: bool) -> Result<Funnel> {
        self.ensure_reachable()?;
        let mut funnels = self.funnels.lock();
        let existing = funnels
            .get(&funnel.id)
            .ok_or_else(|| FunnelError::not_found("funnel", funnel.id.clone()))?;
        if existing.version >= funnel.version {
            return Err(FunnelError::VersionConflict {
                local_version: funnel.version,
                remote_version: existing.version,
            });
        }
        funnels.insert(funnel.id.clone(), funnel.clone());
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(funnel.clone())
    }
}

/// Offline queue kept in memory only.
#[derive(Default)]
pub struct InMemorySyncQueueRepository {
    entries: Mutex<Vec<PendingPush>>,
}

impl InMemorySyncQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncQueueRepository for InMemorySyncQueueRepository {
    async fn load_queue(&self) -> Result<Vec<PendingPush>> {
        Ok(self.entries.lock().clone())
    }

    async fn save_queue(&self, entries: &[PendingPush]) -> Result<()> {
        *self.entries.lock() = entries.to_vec();
        Ok(())
    }
}
