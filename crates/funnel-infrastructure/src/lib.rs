//! File-backed implementations of the funnel engine's storage traits.

pub mod dto;
pub mod file_funnel_repository;
pub mod file_sync_queue_repository;
pub mod file_version_repository;
pub mod paths;
pub mod storage;

pub use crate::file_funnel_repository::FileFunnelRepository;
pub use crate::file_sync_queue_repository::FileSyncQueueRepository;
pub use crate::file_version_repository::FileVersionRepository;
pub use crate::paths::FunnelPaths;
