//! Storage layer for atomic file operations.

mod atomic_json;
mod config_storage;

pub use atomic_json::AtomicJsonFile;
pub(crate) use atomic_json::{FileLock, run_blocking};
pub use config_storage::ConfigStorage;
