//! Application layer for the funnel editor.
//!
//! This crate wires the document store, version history and storage
//! adapters into per-funnel editing sessions with debounced autosave and
//! offline-first sync.

pub mod autosave_scheduler;
pub mod editor_service;
pub mod logging;
pub mod sync_coordinator;

pub use autosave_scheduler::{AutoSaveScheduler, SaveHandler, SaveOutcome, SaveTrigger};
pub use editor_service::{EditorDeps, FunnelEditorService, Selection};
pub use sync_coordinator::{PushOutcome, SaveReceipt, SyncCoordinator};
