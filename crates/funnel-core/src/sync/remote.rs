//! Remote backend contract.

use crate::error::Result;
use crate::funnel::Funnel;
use async_trait::async_trait;

/// The remote funnel store.
///
/// The transport (REST or otherwise) lives outside this crate. Implementations
/// map their failures onto `FunnelError`:
///
/// - unreachable backend: `FunnelError::Network`
/// - unknown funnel: `FunnelError::NotFound`
/// - the remote already holds `funnel.version` or newer:
///   `FunnelError::VersionConflict { remote_version, .. }`
#[async_trait]
pub trait RemoteFunnelStore: Send + Sync {
    async fn load_funnel(&self, funnel_id: &str) -> Result<Funnel>;

    /// Registers a funnel the remote has never seen.
    async fn create_funnel(&self, funnel: &Funnel) -> Result<Funnel>;

    /// Pushes a new version of an existing funnel.
    async fn save_funnel(&self, funnel: &Funnel, is_auto_save: bool) -> Result<Funnel>;
}
