//! Core domain of the funnel editor engine.
//!
//! This crate holds the document model and its in-memory store, the version
//! history manager, and the traits behind which local storage, the remote
//! backend and the offline queue live. It performs no I/O of its own.

pub mod autosave;
pub mod config;
pub mod error;
pub mod event;
pub mod funnel;
pub mod persistence;
pub mod sync;
pub mod version;

pub use error::{FunnelError, Result};
