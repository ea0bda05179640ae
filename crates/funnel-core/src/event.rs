//! Notifications published by an editor session.

use crate::funnel::Funnel;
use crate::sync::SyncReport;
use crate::version::SnapshotLabel;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum EditorEvent {
    /// A save produced a new version.
    Saved { version: u64, label: SnapshotLabel },
    /// Local storage rejected a write; edits are kept in memory only.
    StorageFull,
    /// The remote held a newer version. `remote` is now the live document and
    /// the local state was kept in history as `backup_version_id`.
    ConflictResolved {
        remote: Arc<Funnel>,
        backup_version_id: Option<String>,
    },
    /// A sync pass finished.
    Synced(SyncReport),
    /// The document was replaced by a history snapshot.
    Restored { version_id: String },
    /// The session was torn down; no further events follow.
    Closed,
}
