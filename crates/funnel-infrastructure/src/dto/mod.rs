//! Versioned DTOs for persisted records.
//!
//! Every record carries a top-level `version` key with its schema version.
//! Records are read through a migrator, so older files are upgraded on load.

mod funnel_record;
mod sync_queue;
mod version_history;

pub use funnel_record::{
    FunnelRecordDTO, FunnelRecordV1_0_0, FunnelRecordV1_1_0, create_funnel_record_migrator,
};
pub use sync_queue::{SyncQueue, SyncQueueV1_0_0, create_sync_queue_migrator};
pub use version_history::{VersionHistory, VersionHistoryV1_0_0, create_version_history_migrator};
