//! Local/remote reconciliation.
//!
//! `SyncCoordinator` writes every save to local storage, pushes it to the
//! remote store when the host is online, and queues it otherwise. Queued
//! entries are drained by `sync_with_backend`.
//!
//! Conflicts are detected at push time. A remote copy at the same version
//! counts as already synced only when its content matches. When the remote
//! holds a newer version it wins: the local state is kept in history
//! under the `conflict-backup` label and the remote funnel replaces the live
//! document.

use funnel_core::error::{FunnelError, Result};
use funnel_core::event::EditorEvent;
use funnel_core::funnel::{DocumentStore, Funnel};
use funnel_core::persistence::LocalFunnelRepository;
use funnel_core::sync::{
    Connectivity, PendingPush, RemoteFunnelStore, SyncQueueRepository, SyncReport, enqueue,
};
use funnel_core::version::{SnapshotLabel, VersionManager};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// How a push ended when the remote answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote stored the version.
    Synced,
    /// The remote already held exactly this version.
    Duplicate,
    /// The remote moved past the version this push was based on: either a
    /// higher version, or the same version with different content.
    RemoteNewer { remote_version: u64 },
}

/// Result of `save_funnel`.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReceipt {
    pub version: u64,
    /// Why local storage rejected the write.
    pub local_error: Option<FunnelError>,
    /// `None` when the push failed and the version was queued.
    pub pushed: Option<PushOutcome>,
    /// Why the push failed.
    pub remote_error: Option<FunnelError>,
}

impl SaveReceipt {
    pub fn local_persisted(&self) -> bool {
        self.local_error.is_none()
    }

    /// The saved state is missing from at least one store.
    pub fn unsynced(&self) -> bool {
        !self.local_persisted() || self.pushed.is_none()
    }
}

pub struct SyncCoordinator {
    local: Arc<dyn LocalFunnelRepository>,
    remote: Arc<dyn RemoteFunnelStore>,
    queue: Arc<dyn SyncQueueRepository>,
    versions: Arc<VersionManager>,
    document: Arc<Mutex<DocumentStore>>,
    connectivity: watch::Receiver<Connectivity>,
    events: broadcast::Sender<EditorEvent>,
    /// Serializes saves and sync passes.
    gate: tokio::sync::Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(
        local: Arc<dyn LocalFunnelRepository>,
        remote: Arc<dyn RemoteFunnelStore>,
        queue: Arc<dyn SyncQueueRepository>,
        versions: Arc<VersionManager>,
        document: Arc<Mutex<DocumentStore>>,
        connectivity: watch::Receiver<Connectivity>,
        events: broadcast::Sender<EditorEvent>,
    ) -> Self {
        Self {
            local,
            remote,
            queue,
            versions,
            document,
            connectivity,
            events,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.borrow().is_online()
    }

    /// Persists one version of a funnel.
    ///
    /// The local write is always attempted. The remote push is attempted when
    /// online; if it cannot be made, the version is queued, but only when the
    /// local write succeeded. Fails when neither store took the version.
    pub async fn save_funnel(&self, funnel: &Funnel, is_auto_save: bool) -> Result<SaveReceipt> {
        let _gate = self.gate.lock().await;

        let local = self.local.write(funnel).await;
        if let Err(e) = &local {
            tracing::warn!(target: "funnel::sync", "Local write of funnel {} failed: {}", funnel.id, e);
            if e.is_storage_full() {
                let _ = self.events.send(EditorEvent::StorageFull);
            }
        }

        let pushed = if self.is_online() {
            self.push(funnel, is_auto_save).await
        } else {
            Err(FunnelError::network("host is offline"))
        };

        match pushed {
            Ok(outcome) => {
                let mut queue = self.load_queue().await;
                let before = queue.len();
                queue.retain(|e| e.funnel_id != funnel.id || e.version > funnel.version);
                if queue.len() != before {
                    self.store_queue(&queue).await;
                }

                if let PushOutcome::RemoteNewer { remote_version } = outcome {
                    self.resolve_conflict(funnel, remote_version).await?;
                }

                Ok(SaveReceipt {
                    version: funnel.version,
                    local_error: local.err(),
                    pushed: Some(outcome),
                    remote_error: None,
                })
            }
            Err(remote_error) => {
                if let Err(local_error) = local {
                    return Err(local_error);
                }

                tracing::info!(
                    target: "funnel::sync",
                    "Queued funnel {} v{} for sync: {}",
                    funnel.id,
                    funnel.version,
                    remote_error
                );
                let mut queue = self.load_queue().await;
                if enqueue(&mut queue, PendingPush::new(funnel.clone())) {
                    self.store_queue(&queue).await;
                }

                Ok(SaveReceipt {
                    version: funnel.version,
                    local_error: None,
                    pushed: None,
                    remote_error: Some(remote_error),
                })
            }
        }
    }

    /// Drains the offline queue.
    ///
    /// Entries that fail stay queued. An entry the remote already holds
    /// counts as synced.
    pub async fn sync_with_backend(&self) -> Result<SyncReport> {
        let _gate = self.gate.lock().await;

        let entries = self.queue.load_queue().await?;
        let mut report = SyncReport::default();
        if entries.is_empty() {
            return Ok(report);
        }
        if !self.is_online() {
            report.failed = entries.len();
            return Ok(report);
        }

        let mut kept = Vec::new();
        for mut entry in entries {
            let pushed = self.push(&entry.snapshot, false).await;
            let settled = match pushed {
                Ok(PushOutcome::Synced | PushOutcome::Duplicate) => {
                    report.synced += 1;
                    true
                }
                Ok(PushOutcome::RemoteNewer { remote_version }) => {
                    match self.resolve_conflict(&entry.snapshot, remote_version).await {
                        Ok(()) => {
                            report.conflicts += 1;
                            true
                        }
                        Err(e) => {
                            tracing::warn!(
                                target: "funnel::sync",
                                "Could not resolve conflict for funnel {}: {}",
                                entry.funnel_id,
                                e
                            );
                            false
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        target: "funnel::sync",
                        "Push of funnel {} v{} failed: {}",
                        entry.funnel_id,
                        entry.version,
                        e
                    );
                    false
                }
            };

            if !settled {
                entry.attempts += 1;
                report.failed += 1;
                kept.push(entry);
            }
        }

        self.store_queue(&kept).await;
        tracing::info!(
            target: "funnel::sync",
            "Sync finished: {} synced, {} failed, {} conflicts",
            report.synced,
            report.failed,
            report.conflicts
        );
        let _ = self.events.send(EditorEvent::Synced(report));
        Ok(report)
    }

    /// Returns true if a version of the funnel waits in the queue.
    pub async fn has_pending(&self, funnel_id: &str) -> bool {
        let _gate = self.gate.lock().await;
        self.load_queue().await.iter().any(|e| e.funnel_id == funnel_id)
    }

    async fn push(&self, funnel: &Funnel, is_auto_save: bool) -> Result<PushOutcome> {
        let result = match self.remote.save_funnel(funnel, is_auto_save).await {
            Err(FunnelError::NotFound { .. }) => self.remote.create_funnel(funnel).await,
            other => other,
        };

        match result {
            Ok(_) => Ok(PushOutcome::Synced),
            Err(FunnelError::VersionConflict { remote_version, .. }) => {
                if remote_version == funnel.version {
                    let remote = self.remote.load_funnel(&funnel.id).await?;
                    if remote.same_content(funnel) {
                        tracing::debug!(
                            target: "funnel::sync",
                            "Remote already holds funnel {} v{}",
                            funnel.id,
                            funnel.version
                        );
                        Ok(PushOutcome::Duplicate)
                    } else {
                        // Another client saved the same version number first.
                        Ok(PushOutcome::RemoteNewer { remote_version })
                    }
                } else if remote_version > funnel.version {
                    Ok(PushOutcome::RemoteNewer { remote_version })
                } else {
                    Err(FunnelError::VersionConflict {
                        local_version: funnel.version,
                        remote_version,
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Remote wins: back up the local state, then adopt the remote funnel.
    async fn resolve_conflict(&self, pushed: &Funnel, remote_version: u64) -> Result<()> {
        let remote = self.remote.load_funnel(&pushed.id).await?;
        tracing::warn!(
            target: "funnel::sync",
            "Funnel {} v{} lost to remote v{}",
            pushed.id,
            pushed.version,
            remote_version
        );

        let local_state = {
            let document = self.document.lock();
            let live = document.funnel();
            if live.id == pushed.id {
                live.with_version(pushed.version, live.last_modified)
            } else {
                pushed.clone()
            }
        };
        let backup_version_id = match self
            .versions
            .record(&local_state, SnapshotLabel::ConflictBackup)
            .await
        {
            Ok(meta) => Some(meta.id),
            Err(e) => {
                tracing::error!(
                    target: "funnel::sync",
                    "Could not back up funnel {} before adopting remote: {}",
                    pushed.id,
                    e
                );
                None
            }
        };

        if let Err(e) = self.local.write(&remote).await {
            tracing::warn!(target: "funnel::sync", "Local write of remote funnel {} failed: {}", remote.id, e);
        }

        let adopted = {
            let mut document = self.document.lock();
            if document.funnel().id == remote.id {
                document.adopt_remote(remote)
            } else {
                Arc::new(remote)
            }
        };

        let _ = self.events.send(EditorEvent::ConflictResolved {
            remote: adopted,
            backup_version_id,
        });
        Ok(())
    }

    async fn load_queue(&self) -> Vec<PendingPush> {
        match self.queue.load_queue().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(target: "funnel::sync", "Could not read sync queue: {}", e);
                Vec::new()
            }
        }
    }

    async fn store_queue(&self, entries: &[PendingPush]) {
        if let Err(e) = self.queue.save_queue(entries).await {
            tracing::warn!(target: "funnel::sync", "Could not write sync queue: {}", e);
        }
    }
}
