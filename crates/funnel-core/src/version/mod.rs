//! Snapshot history of funnels.

mod manager;
pub mod memory;
mod model;
mod repository;

pub use manager::{DEFAULT_MAX_ENTRIES, VersionManager};
pub use memory::InMemoryVersionRepository;
pub use model::{HistorySummary, SnapshotLabel, VersionMeta, VersionSnapshot};
pub use repository::VersionRepository;
