//! Autosave value types shared by the scheduler and its observers.

mod backoff;
mod state;

pub use backoff::Backoff;
pub use state::{AutoSaveState, AutoSaveStatus};
