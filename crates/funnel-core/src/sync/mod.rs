//! Remote synchronization contracts and the offline queue.

pub mod memory;
mod model;
mod queue;
mod remote;

pub use memory::{InMemoryRemoteStore, InMemorySyncQueueRepository};
pub use model::{Connectivity, SyncReport};
pub use queue::{PendingPush, SyncQueueRepository, enqueue};
pub use remote::RemoteFunnelStore;
