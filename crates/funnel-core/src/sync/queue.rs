//! Offline push queue.

use crate::error::Result;
use crate::funnel::Funnel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot waiting to be pushed to the remote store.
///
/// Entries are keyed by funnel id and version. A newer entry for the same
/// funnel supersedes the older one, since the remote only needs the latest
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPush {
    pub funnel_id: String,
    pub version: u64,
    pub snapshot: Funnel,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
}

impl PendingPush {
    pub fn new(snapshot: Funnel) -> Self {
        Self {
            funnel_id: snapshot.id.clone(),
            version: snapshot.version,
            snapshot,
            queued_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// Inserts `entry`, replacing any older entry for the same funnel.
///
/// An entry older than the one already queued is ignored; an entry with the
/// same version replaces it. Returns true when the queue changed.
pub fn enqueue(queue: &mut Vec<PendingPush>, entry: PendingPush) -> bool {
    match queue.iter_mut().find(|e| e.funnel_id == entry.funnel_id) {
        Some(existing) if existing.version > entry.version => false,
        Some(existing) => {
            *existing = entry;
            true
        }
        None => {
            queue.push(entry);
            true
        }
    }
}

/// Durable storage of the offline queue. The queue is written whole.
#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    async fn load_queue(&self) -> Result<Vec<PendingPush>>;

    async fn save_queue(&self, entries: &[PendingPush]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::default_funnel;

    fn entry(funnel_id: &str, version: u64) -> PendingPush {
        let mut funnel = default_funnel("Queued");
        funnel.id = funnel_id.to_string();
        funnel.version = version;
        PendingPush::new(funnel)
    }

    #[test]
    fn test_enqueue_coalesces_per_funnel() {
        let mut queue = Vec::new();
        assert!(enqueue(&mut queue, entry("a", 1)));
        assert!(enqueue(&mut queue, entry("b", 1)));
        assert!(enqueue(&mut queue, entry("a", 3)));
        assert!(!enqueue(&mut queue, entry("a", 2)));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].funnel_id, "a");
        assert_eq!(queue[0].version, 3);
    }
}
