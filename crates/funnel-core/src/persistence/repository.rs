//! Local persistence trait.

use crate::error::Result;
use crate::funnel::Funnel;
use async_trait::async_trait;

/// Durable, client-local store of full funnel documents keyed by funnel id.
///
/// # Implementation Notes
///
/// - `write` must be atomic for readers: a concurrent `read` sees either the
///   previous document or the new one, never a partial write.
/// - Stores are size-bounded. A write that does not fit must fail with
///   `FunnelError::StorageFull` and leave the previous record intact.
#[async_trait]
pub trait LocalFunnelRepository: Send + Sync {
    /// Overwrites the record of `funnel.id`.
    async fn write(&self, funnel: &Funnel) -> Result<()>;

    /// Reads a record.
    ///
    /// - `Ok(Some(funnel))`: record found
    /// - `Ok(None)`: no record for this id
    async fn read(&self, funnel_id: &str) -> Result<Option<Funnel>>;

    /// Deletes a record. Deleting a missing record is not an error.
    async fn delete(&self, funnel_id: &str) -> Result<()>;

    /// Ids of every stored funnel, sorted.
    async fn list_ids(&self) -> Result<Vec<String>>;
}
