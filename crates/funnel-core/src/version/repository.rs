//! Version history repository trait.

use super::model::VersionSnapshot;
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage of a funnel's snapshot history.
///
/// History is stored as one ordered list per funnel (oldest first) and is
/// always written whole. Eviction policy belongs to `VersionManager`.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Loads the history of a funnel. A funnel without history yields an empty list.
    async fn load_history(&self, funnel_id: &str) -> Result<Vec<VersionSnapshot>>;

    /// Replaces the stored history of a funnel.
    async fn save_history(&self, funnel_id: &str, snapshots: &[VersionSnapshot]) -> Result<()>;

    /// Removes the history of a funnel. Missing history is not an error.
    async fn delete_history(&self, funnel_id: &str) -> Result<()>;
}
