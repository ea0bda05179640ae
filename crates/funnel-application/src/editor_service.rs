//! Editor session façade.
//!
//! `FunnelEditorService` is the single entry point the UI talks to. One
//! service instance exists per open funnel; it owns the document store, the
//! autosave scheduler, the sync coordinator and the sync listener,
//! and tears all of them down in `close`.

use crate::autosave_scheduler::{AutoSaveScheduler, SaveHandler, SaveOutcome, SaveTrigger};
use crate::sync_coordinator::{PushOutcome, SyncCoordinator};
use async_trait::async_trait;
use chrono::Utc;
use funnel_core::autosave::{AutoSaveState, Backoff};
use funnel_core::config::{AutoSaveConfig, EditorConfig};
use funnel_core::error::{FunnelError, Result};
use funnel_core::event::EditorEvent;
use funnel_core::funnel::{
    Block, BlockPatch, ConfigPatch, DocumentEvent, DocumentStore, Funnel, Page, PageDraft,
    PagePatch, SettingsPatch, default_funnel,
};
use funnel_core::persistence::{InMemoryFunnelRepository, LocalFunnelRepository};
use funnel_core::sync::{
    Connectivity, InMemorySyncQueueRepository, RemoteFunnelStore, SyncQueueRepository, SyncReport,
};
use funnel_core::version::{
    HistorySummary, InMemoryVersionRepository, SnapshotLabel, VersionManager, VersionMeta,
    VersionRepository, VersionSnapshot,
};
use funnel_infrastructure::storage::ConfigStorage;
use funnel_infrastructure::{
    FileFunnelRepository, FileSyncQueueRepository, FileVersionRepository, FunnelPaths,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 64;

/// Storage backends and host signals shared by editor sessions.
#[derive(Clone)]
pub struct EditorDeps {
    pub config: EditorConfig,
    pub local: Arc<dyn LocalFunnelRepository>,
    pub versions: Arc<dyn VersionRepository>,
    pub queue: Arc<dyn SyncQueueRepository>,
    pub remote: Arc<dyn RemoteFunnelStore>,
    /// Online/offline transitions reported by the host.
    pub connectivity: watch::Receiver<Connectivity>,
}

impl EditorDeps {
    /// Reads `config.toml` from the platform config directory. A missing
    /// file yields the defaults.
    pub fn load_config() -> Result<EditorConfig> {
        ConfigStorage::new(FunnelPaths::config_file()?).load_config()
    }

    /// File-backed storage under the configured data directory.
    pub fn file_backed(
        config: EditorConfig,
        remote: Arc<dyn RemoteFunnelStore>,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Result<Self> {
        let paths = FunnelPaths::new(config.storage.base_dir.clone())?;
        tracing::debug!(
            target: "funnel::editor",
            "Using data directory {}",
            paths.data_dir().display()
        );

        Ok(Self {
            local: Arc::new(FileFunnelRepository::new(&paths, config.storage.quota_bytes)?),
            versions: Arc::new(FileVersionRepository::new(&paths)?),
            queue: Arc::new(FileSyncQueueRepository::new(&paths)?),
            remote,
            connectivity,
            config,
        })
    }

    /// Process-local storage; nothing survives the process.
    pub fn in_memory(
        config: EditorConfig,
        remote: Arc<dyn RemoteFunnelStore>,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Self {
        Self {
            local: Arc::new(InMemoryFunnelRepository::new(config.storage.quota_bytes)),
            versions: Arc::new(InMemoryVersionRepository::new()),
            queue: Arc::new(InMemorySyncQueueRepository::new()),
            remote,
            connectivity,
            config,
        }
    }

    /// Ids of every funnel persisted in local storage.
    pub async fn list_local_funnels(&self) -> Result<Vec<String>> {
        self.local.list_ids().await
    }
}

/// Page and block the user is working on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub current_page_id: Option<String>,
    pub selected_block_id: Option<String>,
}

impl Selection {
    fn first_page(funnel: &Funnel) -> Self {
        Self {
            current_page_id: funnel.pages.first().map(|p| p.id.clone()),
            selected_block_id: None,
        }
    }
}

/// Save path invoked by the scheduler task.
struct SessionCore {
    document: Arc<Mutex<DocumentStore>>,
    coordinator: Arc<SyncCoordinator>,
    versions: Arc<VersionManager>,
    events: broadcast::Sender<EditorEvent>,
    /// Wakes the sync listener when a push had to be queued.
    retry: Arc<Notify>,
}

#[async_trait]
impl SaveHandler for SessionCore {
    async fn save(&self, trigger: SaveTrigger) -> Result<SaveOutcome> {
        let saved_at = Utc::now();
        let snapshot = self.document.lock().begin_save(saved_at);
        let funnel = Arc::clone(&snapshot.funnel);

        let receipt = self
            .coordinator
            .save_funnel(&funnel, trigger.is_auto())
            .await?;
        if receipt.remote_error.is_some() {
            self.retry.notify_one();
        }

        if let Some(PushOutcome::RemoteNewer { remote_version }) = receipt.pushed {
            // The remote copy replaced the document; nothing of ours to record.
            return Ok(SaveOutcome {
                version: remote_version,
                saved_at,
                unsynced: false,
                partial_error: None,
            });
        }

        self.document.lock().mark_persisted(&snapshot);

        let label = match trigger {
            SaveTrigger::Auto => SnapshotLabel::Autosave,
            SaveTrigger::Manual => SnapshotLabel::Manual,
        };
        if let Err(e) = self.versions.record(&funnel, label).await {
            tracing::warn!(
                target: "funnel::editor",
                "Could not record version {} of funnel {}: {}",
                funnel.version,
                funnel.id,
                e
            );
        }
        let _ = self.events.send(EditorEvent::Saved {
            version: funnel.version,
            label,
        });

        let unsynced = receipt.unsynced();
        Ok(SaveOutcome {
            version: funnel.version,
            saved_at,
            unsynced,
            partial_error: receipt.remote_error.or(receipt.local_error),
        })
    }
}

/// One sync pass plus the unsynced flag refresh that follows it.
#[derive(Clone)]
struct SyncPass {
    funnel_id: String,
    coordinator: Arc<SyncCoordinator>,
    scheduler: Arc<AutoSaveScheduler>,
}

impl SyncPass {
    async fn run(&self) -> Result<SyncReport> {
        let report = self.coordinator.sync_with_backend().await?;

        let pending = self.coordinator.has_pending(&self.funnel_id).await;
        let storage_full = self
            .scheduler
            .state()
            .last_error
            .as_ref()
            .is_some_and(FunnelError::is_storage_full);
        self.scheduler.set_unsynced(pending || storage_full);

        Ok(report)
    }
}

/// Editing session for one funnel.
///
/// # Responsibilities
///
/// - Applying document mutations and scheduling autosave after each one
/// - Tracking the current page and selected block
/// - Exposing version history and restore
/// - Running a sync pass when the host comes back online, and retrying
///   queued pushes while it stays online
///
/// # Teardown
///
/// `close` cancels the debounce timer and the sync listener, waits
/// for an in-flight save or sync pass, then publishes `EditorEvent::Closed`.
/// Dropping the service without `close` cancels the background tasks
/// without waiting for them.
pub struct FunnelEditorService {
    funnel_id: String,
    document: Arc<Mutex<DocumentStore>>,
    selection: Mutex<Selection>,
    versions: Arc<VersionManager>,
    sync: SyncPass,
    scheduler: Arc<AutoSaveScheduler>,
    events: broadcast::Sender<EditorEvent>,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl FunnelEditorService {
    /// Opens a session on a new funnel built from the default template.
    ///
    /// The funnel exists only in memory until the first save; it is marked
    /// dirty so autosave picks it up.
    pub fn create_new_funnel(deps: EditorDeps, name: &str) -> Self {
        let funnel = default_funnel(name);
        tracing::info!(target: "funnel::editor", "Created funnel {} ({})", funnel.id, name);

        let versions = Arc::new(VersionManager::new(
            deps.versions.clone(),
            deps.config.history.max_entries,
        ));
        let service = Self::open(deps, funnel, versions);
        service.scheduler.touch();
        service
    }

    /// Opens a session on a stored funnel.
    ///
    /// The local copy is read first. When online, the remote copy is fetched
    /// as well and wins if its version is higher. Fails with `NotFound` when
    /// neither store has the funnel.
    pub async fn load_funnel(deps: EditorDeps, funnel_id: &str) -> Result<Self> {
        let (local, local_error) = match deps.local.read(funnel_id).await {
            Ok(local) => (local, None),
            Err(e) => {
                tracing::warn!(target: "funnel::editor", "Could not read local funnel {}: {}", funnel_id, e);
                (None, Some(e))
            }
        };

        let online = deps.connectivity.borrow().is_online();
        let remote = if online {
            match deps.remote.load_funnel(funnel_id).await {
                Ok(remote) => Some(remote),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    tracing::warn!(target: "funnel::editor", "Could not fetch remote funnel {}: {}", funnel_id, e);
                    None
                }
            }
        } else {
            None
        };

        let mut funnel = match (local, remote) {
            (Some(local), Some(remote)) if remote.version > local.version => {
                Self::cache_locally(&deps, &remote).await;
                remote
            }
            (Some(local), _) => local,
            (None, Some(remote)) => {
                Self::cache_locally(&deps, &remote).await;
                remote
            }
            (None, None) => {
                return Err(local_error.unwrap_or_else(|| FunnelError::not_found("funnel", funnel_id)));
            }
        };

        let versions = Arc::new(VersionManager::new(
            deps.versions.clone(),
            deps.config.history.max_entries,
        ));
        // Keep new versions above anything already in history.
        match versions.latest_version(funnel_id).await {
            Ok(Some(latest)) if latest > funnel.version => funnel.version = latest,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(target: "funnel::editor", "Could not read history of funnel {}: {}", funnel_id, e);
            }
        }

        tracing::info!(
            target: "funnel::editor",
            "Loaded funnel {} at version {}",
            funnel.id,
            funnel.version
        );
        Ok(Self::open(deps, funnel, versions))
    }

    async fn cache_locally(deps: &EditorDeps, funnel: &Funnel) {
        if let Err(e) = deps.local.write(funnel).await {
            tracing::warn!(target: "funnel::editor", "Could not cache funnel {} locally: {}", funnel.id, e);
        }
    }

    fn open(deps: EditorDeps, funnel: Funnel, versions: Arc<VersionManager>) -> Self {
        let funnel_id = funnel.id.clone();
        let selection = Selection::first_page(&funnel);
        let document = Arc::new(Mutex::new(DocumentStore::new(funnel)));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let coordinator = Arc::new(SyncCoordinator::new(
            deps.local.clone(),
            deps.remote.clone(),
            deps.queue.clone(),
            versions.clone(),
            document.clone(),
            deps.connectivity.clone(),
            events.clone(),
        ));
        let retry = Arc::new(Notify::new());
        let core = Arc::new(SessionCore {
            document: document.clone(),
            coordinator: coordinator.clone(),
            versions: versions.clone(),
            events: events.clone(),
            retry: retry.clone(),
        });
        let scheduler = Arc::new(AutoSaveScheduler::spawn(
            core,
            &deps.config.autosave,
            cancel.child_token(),
        ));

        let sync = SyncPass {
            funnel_id: funnel_id.clone(),
            coordinator,
            scheduler: scheduler.clone(),
        };
        let listener = SyncListener::new(
            sync.clone(),
            deps.connectivity.clone(),
            deps.config.sync.online_debounce(),
            &deps.config.autosave,
            retry,
            cancel.child_token(),
        );
        let listener = tokio::spawn(listener.run());

        Self {
            funnel_id,
            document,
            selection: Mutex::new(selection),
            versions,
            sync,
            scheduler,
            events,
            cancel,
            listener: Mutex::new(Some(listener)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn funnel_id(&self) -> &str {
        &self.funnel_id
    }

    /// Current document value.
    pub fn funnel(&self) -> Arc<Funnel> {
        self.document.lock().funnel()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ============================================================================
    // Saving and sync
    // ============================================================================

    /// Saves immediately and reports the result, including a remote push
    /// failure that left the version queued locally.
    pub async fn save_funnel(&self) -> Result<SaveOutcome> {
        self.ensure_open()?;
        self.scheduler.save_now().await
    }

    /// Drains the offline queue now.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.ensure_open()?;
        self.sync.run().await
    }

    /// Enables or disables autosave, optionally changing the debounce window.
    pub fn set_auto_save(&self, enabled: bool, interval: Option<Duration>) {
        if let Some(interval) = interval {
            self.scheduler.set_interval(interval);
        }
        self.scheduler.set_enabled(enabled);
    }

    pub fn auto_save_state(&self) -> AutoSaveState {
        self.scheduler.state()
    }

    /// Autosave state changes. The channel closes when the session closes.
    pub fn subscribe_state(&self) -> watch::Receiver<AutoSaveState> {
        self.scheduler.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    /// Page and block deletions, and whole-document replacements.
    pub fn subscribe_document(&self) -> broadcast::Receiver<DocumentEvent> {
        self.document.lock().subscribe()
    }

    // ============================================================================
    // Page operations
    // ============================================================================

    /// Adds a page after `after_id` (or at the end) and makes it current.
    pub fn add_page(&self, after_id: Option<&str>, draft: PageDraft) -> Result<Arc<Page>> {
        let (_, page) = self.mutate("add_page", |doc| doc.add_page(after_id, draft))?;
        *self.selection.lock() = Selection {
            current_page_id: Some(page.id.clone()),
            selected_block_id: None,
        };
        Ok(page)
    }

    pub fn update_page(&self, page_id: &str, patch: &PagePatch) -> Result<Arc<Funnel>> {
        self.mutate("update_page", |doc| doc.update_page(page_id, patch))
    }

    pub fn update_page_settings(
        &self,
        page_id: &str,
        settings: &SettingsPatch,
    ) -> Result<Arc<Funnel>> {
        self.mutate("update_page_settings", |doc| {
            doc.update_page_settings(page_id, settings)
        })
    }

    /// Deletes a page with its blocks. If it was the current page, the
    /// selection moves to the page that took its place, or the new last page.
    pub fn delete_page(&self, page_id: &str) -> Result<Arc<Funnel>> {
        let removal = self.mutate("delete_page", |doc| doc.delete_page(page_id))?;

        let mut selection = self.selection.lock();
        if selection.current_page_id.as_deref() == Some(page_id) {
            let pages = &removal.funnel.pages;
            let neighbour = pages.get(removal.index.min(pages.len().saturating_sub(1)));
            selection.current_page_id = neighbour.map(|p| p.id.clone());
            selection.selected_block_id = None;
        }
        Ok(removal.funnel)
    }

    pub fn move_page(&self, page_id: &str, new_index: usize) -> Result<Arc<Funnel>> {
        self.mutate("move_page", |doc| doc.move_page(page_id, new_index))
    }

    pub fn duplicate_page(&self, page_id: &str) -> Result<Arc<Page>> {
        let (_, page) = self.mutate("duplicate_page", |doc| doc.duplicate_page(page_id))?;
        Ok(page)
    }

    // ============================================================================
    // Selection
    // ============================================================================

    /// Current selection. A page that no longer exists falls back to the
    /// first page.
    pub fn selection(&self) -> Selection {
        let funnel = self.funnel();
        let mut selection = self.selection.lock();

        match selection.current_page_id.as_deref().and_then(|id| funnel.page(id)) {
            Some(page) => {
                let block_gone = selection
                    .selected_block_id
                    .as_deref()
                    .is_some_and(|id| page.block(id).is_none());
                if block_gone {
                    selection.selected_block_id = None;
                }
            }
            None => *selection = Selection::first_page(&funnel),
        }
        selection.clone()
    }

    pub fn set_current_page(&self, page_id: &str) -> Result<()> {
        if self.funnel().page(page_id).is_none() {
            let err = FunnelError::not_found("page", page_id);
            tracing::warn!(target: "funnel::editor", "set_current_page ignored: {}", err);
            return Err(err);
        }
        *self.selection.lock() = Selection {
            current_page_id: Some(page_id.to_string()),
            selected_block_id: None,
        };
        Ok(())
    }

    /// Selects a block on the current page, or clears the block selection.
    pub fn select_block(&self, block_id: Option<&str>) -> Result<()> {
        let current = self.selection();
        if let Some(block_id) = block_id {
            let funnel = self.funnel();
            let on_page = current
                .current_page_id
                .as_deref()
                .and_then(|id| funnel.page(id))
                .is_some_and(|page| page.block(block_id).is_some());
            if !on_page {
                let err = FunnelError::not_found("block", block_id);
                tracing::warn!(target: "funnel::editor", "select_block ignored: {}", err);
                return Err(err);
            }
        }
        self.selection.lock().selected_block_id = block_id.map(str::to_string);
        Ok(())
    }

    // ============================================================================
    // Block operations
    // ============================================================================

    pub fn add_block(&self, page_id: &str, block: Block) -> Result<Arc<Funnel>> {
        self.mutate("add_block", |doc| doc.add_block(page_id, block))
    }

    pub fn update_block(
        &self,
        page_id: &str,
        block_id: &str,
        patch: &BlockPatch,
    ) -> Result<Arc<Funnel>> {
        self.mutate("update_block", |doc| doc.update_block(page_id, block_id, patch))
    }

    pub fn delete_block(&self, page_id: &str, block_id: &str) -> Result<Arc<Funnel>> {
        let funnel = self.mutate("delete_block", |doc| doc.delete_block(page_id, block_id))?;

        let mut selection = self.selection.lock();
        if selection.selected_block_id.as_deref() == Some(block_id) {
            selection.selected_block_id = None;
        }
        Ok(funnel)
    }

    pub fn reorder_blocks(&self, page_id: &str, ordered_ids: &[String]) -> Result<Arc<Funnel>> {
        self.mutate("reorder_blocks", |doc| doc.reorder_blocks(page_id, ordered_ids))
    }

    pub fn duplicate_block(&self, page_id: &str, block_id: &str) -> Result<Arc<Block>> {
        let (_, block) = self.mutate("duplicate_block", |doc| {
            doc.duplicate_block(page_id, block_id)
        })?;
        Ok(block)
    }

    // ============================================================================
    // Funnel-level operations
    // ============================================================================

    pub fn update_funnel_config(&self, patch: &ConfigPatch) -> Result<Arc<Funnel>> {
        self.mutate("update_funnel_config", |doc| doc.update_config(patch))
    }

    pub fn rename_funnel(&self, name: &str) -> Result<Arc<Funnel>> {
        self.mutate("rename_funnel", |doc| doc.rename(name))
    }

    // ============================================================================
    // Version history
    // ============================================================================

    /// History metadata, newest first.
    pub async fn version_history(&self) -> Result<Vec<VersionMeta>> {
        self.versions.history(&self.funnel_id).await
    }

    pub async fn version_snapshot(&self, version_id: &str) -> Result<VersionSnapshot> {
        self.versions.snapshot(&self.funnel_id, version_id).await
    }

    pub async fn history_summary(&self) -> Result<HistorySummary> {
        self.versions.summary(&self.funnel_id).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.ensure_open()?;
        self.versions.clear_history(&self.funnel_id).await
    }

    /// Replaces the document with a history snapshot.
    ///
    /// History is left as is. The restored document is dirty and its next
    /// save creates a new version above the latest one.
    pub async fn restore_version(&self, version_id: &str) -> Result<Arc<Funnel>> {
        self.ensure_open()?;
        let snapshot = self
            .versions
            .restore_version(&self.funnel_id, version_id)
            .await?;

        let funnel = self.document.lock().restore(snapshot);
        *self.selection.lock() = Selection::first_page(&funnel);
        self.scheduler.touch();

        tracing::info!(
            target: "funnel::editor",
            "Restored funnel {} from version {}",
            self.funnel_id,
            version_id
        );
        let _ = self.events.send(EditorEvent::Restored {
            version_id: version_id.to_string(),
        });
        Ok(funnel)
    }

    // ============================================================================
    // Teardown
    // ============================================================================

    /// Ends the session. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        self.scheduler.shutdown().await;
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                tracing::error!(target: "funnel::editor", "Sync listener failed: {}", e);
            }
        }

        let _ = self.events.send(EditorEvent::Closed);
        tracing::info!(target: "funnel::editor", "Closed funnel {}", self.funnel_id);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(FunnelError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Runs a document mutation and schedules autosave when it succeeds.
    fn mutate<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut DocumentStore) -> Result<T>,
    ) -> Result<T> {
        self.ensure_open()?;
        let result = {
            let mut document = self.document.lock();
            f(&mut *document)
        };

        match &result {
            Ok(_) => self.scheduler.touch(),
            Err(e) if e.is_not_found() => {
                tracing::warn!(target: "funnel::editor", "{} ignored: {}", operation, e);
            }
            Err(_) => {}
        }
        result
    }
}

impl Drop for FunnelEditorService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background sync for one session.
///
/// Runs one sync pass per offline-to-online transition. The pass starts
/// after `debounce`; transitions during that window are coalesced and the
/// pass is skipped if the host went offline again.
///
/// While the host stays online, queued versions of this funnel are retried
/// with exponential backoff until the queue holds none of them. Retries are
/// started by a queued save and paused while offline.
struct SyncListener {
    sync: SyncPass,
    connectivity: watch::Receiver<Connectivity>,
    debounce: Duration,
    retry: Arc<Notify>,
    backoff: Backoff,
    retry_at: Option<Instant>,
    cancel: CancellationToken,
}

impl SyncListener {
    fn new(
        sync: SyncPass,
        connectivity: watch::Receiver<Connectivity>,
        debounce: Duration,
        config: &AutoSaveConfig,
        retry: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sync,
            connectivity,
            debounce,
            retry,
            backoff: Backoff::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
            retry_at: None,
            cancel,
        }
    }

    async fn run(mut self) {
        let mut last = *self.connectivity.borrow_and_update();
        let retry = self.retry.clone();
        let cancel = self.cancel.clone();

        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = self.connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now = *self.connectivity.borrow_and_update();
                    let came_online = !last.is_online() && now.is_online();
                    last = now;
                    if !came_online {
                        continue;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.debounce) => {}
                    }
                    last = *self.connectivity.borrow_and_update();
                    if !last.is_online() {
                        continue;
                    }

                    tracing::info!(target: "funnel::sync", "Back online, syncing funnel {}", self.sync.funnel_id);
                    self.backoff.reset();
                    self.run_pass().await;
                }
                _ = retry.notified() => {
                    if self.retry_at.is_none() {
                        self.schedule_retry();
                    }
                }
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    if !self.connectivity.borrow().is_online() {
                        // The reconnect pass takes over.
                        self.backoff.reset();
                        continue;
                    }
                    if !self.sync.coordinator.has_pending(&self.sync.funnel_id).await {
                        self.backoff.reset();
                        continue;
                    }
                    tracing::info!(
                        target: "funnel::sync",
                        "Retrying queued pushes of funnel {} (attempt {})",
                        self.sync.funnel_id,
                        self.backoff.failures()
                    );
                    self.run_pass().await;
                }
            }
        }

        tracing::debug!(target: "funnel::sync", "Sync listener stopped");
    }

    /// Runs a pass and re-arms the retry timer if this funnel is still queued.
    async fn run_pass(&mut self) {
        let pending = match self.sync.run().await {
            Ok(_) => self.sync.coordinator.has_pending(&self.sync.funnel_id).await,
            Err(e) => {
                tracing::warn!(target: "funnel::sync", "Sync of funnel {} failed: {}", self.sync.funnel_id, e);
                true
            }
        };

        if pending {
            self.schedule_retry();
        } else {
            self.retry_at = None;
            self.backoff.reset();
        }
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        self.retry_at = Some(Instant::now() + delay);
        tracing::debug!(
            target: "funnel::sync",
            "Next sync retry for funnel {} in {}ms",
            self.sync.funnel_id,
            delay.as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::funnel::PageType;
    use funnel_core::sync::InMemoryRemoteStore;

    fn service() -> (FunnelEditorService, watch::Sender<Connectivity>) {
        let (connectivity, rx) = watch::channel(Connectivity::Online);
        let deps = EditorDeps::in_memory(
            EditorConfig::default(),
            Arc::new(InMemoryRemoteStore::new()),
            rx,
        );
        (FunnelEditorService::create_new_funnel(deps, "Quiz"), connectivity)
    }

    #[tokio::test]
    async fn test_new_funnel_selects_first_page() {
        let (service, _connectivity) = service();
        let funnel = service.funnel();

        assert_eq!(funnel.version, 0);
        assert_eq!(
            service.selection().current_page_id.as_deref(),
            Some(funnel.pages[0].id.as_str())
        );
        assert!(service.auto_save_state().enabled);
        service.close().await;
    }

    #[tokio::test]
    async fn test_deleting_current_page_selects_neighbour() {
        let (service, _connectivity) = service();
        let first = service.funnel().pages[0].id.clone();
        let second = service
            .add_page(Some(&first), PageDraft::new("Second", PageType::Question))
            .unwrap();
        let third = service
            .add_page(Some(&second.id), PageDraft::new("Third", PageType::Result))
            .unwrap();

        service.set_current_page(&second.id).unwrap();
        service.delete_page(&second.id).unwrap();
        assert_eq!(
            service.selection().current_page_id.as_deref(),
            Some(third.id.as_str())
        );

        service.delete_page(&third.id).unwrap();
        assert_eq!(
            service.selection().current_page_id.as_deref(),
            Some(first.as_str())
        );
        service.close().await;
    }

    #[tokio::test]
    async fn test_deleting_selected_block_clears_selection() {
        let (service, _connectivity) = service();
        let page = service.funnel().pages[0].clone();
        let block_id = page.blocks[0].id.clone();

        service.select_block(Some(&block_id)).unwrap();
        assert_eq!(service.selection().selected_block_id.as_deref(), Some(block_id.as_str()));

        service.delete_block(&page.id, &block_id).unwrap();
        assert!(service.selection().selected_block_id.is_none());
        service.close().await;
    }

    #[tokio::test]
    async fn test_selecting_unknown_targets_is_not_found() {
        let (service, _connectivity) = service();

        assert!(service.set_current_page("missing").unwrap_err().is_not_found());
        assert!(service.select_block(Some("missing")).unwrap_err().is_not_found());
        assert!(service.delete_page("missing").unwrap_err().is_not_found());
        service.close().await;
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let (service, _connectivity) = service();
        let mut events = service.subscribe_events();

        service.close().await;
        service.close().await;

        assert!(service.is_closed());
        assert!(matches!(events.recv().await, Ok(EditorEvent::Closed)));
        assert_eq!(
            service.rename_funnel("Renamed").unwrap_err(),
            FunnelError::SessionClosed
        );
        assert_eq!(
            service.save_funnel().await.unwrap_err(),
            FunnelError::SessionClosed
        );
    }

    #[tokio::test]
    async fn test_manual_save_records_manual_version() {
        let (service, _connectivity) = service();

        let outcome = service.save_funnel().await.unwrap();

        assert_eq!(outcome.version, 1);
        assert!(!outcome.unsynced);
        let history = service.version_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].label, SnapshotLabel::Manual);
        assert_eq!(service.funnel().version, 1);
        service.close().await;
    }
}
