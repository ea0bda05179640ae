//! Debounced autosave.
//!
//! The scheduler runs as one tokio task per editor session. Callers talk to
//! it over a command channel, and it publishes `AutoSaveState` through a
//! `watch` channel. Saves run inside the task loop, so at most one save is in
//! flight; commands that arrive meanwhile are handled once it completes.
//!
//! The debounce deadline is armed by the first mutation after the scheduler
//! went idle and is not pushed back by later mutations. A manual save drops
//! the deadline and saves immediately. Every settled save publishes `Saved`
//! or `Error` and then returns to `Idle`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use funnel_core::autosave::{AutoSaveState, AutoSaveStatus, Backoff};
use funnel_core::config::AutoSaveConfig;
use funnel_core::error::{FunnelError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// What started a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Auto,
    Manual,
}

impl SaveTrigger {
    pub fn is_auto(self) -> bool {
        self == Self::Auto
    }
}

/// Result of a save that produced a new version.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    /// The saved state did not reach every store.
    pub unsynced: bool,
    /// Set when the version reached only one of the local and remote stores.
    pub partial_error: Option<FunnelError>,
}

/// Performs the actual persistence. Called only from the scheduler task,
/// never concurrently with itself.
#[async_trait]
pub trait SaveHandler: Send + Sync + 'static {
    async fn save(&self, trigger: SaveTrigger) -> Result<SaveOutcome>;
}

enum Command {
    /// The document changed.
    Touch,
    SaveNow(oneshot::Sender<Result<SaveOutcome>>),
    Configure {
        enabled: Option<bool>,
        interval: Option<Duration>,
    },
    SetUnsynced(bool),
}

pub struct AutoSaveScheduler {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AutoSaveState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSaveScheduler {
    /// Spawns the scheduler task on the current runtime.
    ///
    /// Cancelling `cancel` (or calling `shutdown`) stops the task after any
    /// in-flight save finishes.
    pub fn spawn(
        handler: Arc<dyn SaveHandler>,
        config: &AutoSaveConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let initial = AutoSaveState::new(config.enabled, config.debounce_ms);
        let (state_tx, state) = watch::channel(initial.clone());

        let worker = Worker {
            handler,
            state: initial,
            publisher: state_tx,
            deadline: None,
            interval: config.debounce(),
            backoff: Backoff::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run(receiver));

        Self {
            commands,
            state,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Records a mutation. Arms the debounce timer if autosave is enabled and
    /// no timer is armed.
    pub fn touch(&self) {
        let _ = self.commands.send(Command::Touch);
    }

    /// Saves now, bypassing the debounce window, and reports the result.
    pub async fn save_now(&self) -> Result<SaveOutcome> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SaveNow(reply))
            .map_err(|_| FunnelError::SessionClosed)?;
        response.await.map_err(|_| FunnelError::SessionClosed)?
    }

    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(Command::Configure {
            enabled: Some(enabled),
            interval: None,
        });
    }

    /// Changes the debounce window. Applies to timers armed afterwards.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.commands.send(Command::Configure {
            enabled: None,
            interval: Some(interval),
        });
    }

    /// Overrides the unsynced indicator after an out-of-band sync.
    pub fn set_unsynced(&self, unsynced: bool) {
        let _ = self.commands.send(Command::SetUnsynced(unsynced));
    }

    pub fn state(&self) -> AutoSaveState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes. The channel closes at shutdown.
    pub fn subscribe(&self) -> watch::Receiver<AutoSaveState> {
        self.state.clone()
    }

    /// Stops the task and waits for it. An in-flight save completes first.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(target: "funnel::autosave", "Scheduler task failed: {}", e);
            }
        }
    }
}

impl Drop for AutoSaveScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    handler: Arc<dyn SaveHandler>,
    state: AutoSaveState,
    publisher: watch::Sender<AutoSaveState>,
    deadline: Option<Instant>,
    interval: Duration,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(target: "funnel::autosave", "Scheduler started");

        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    if self.state.dirty {
                        let _ = self.run_save(SaveTrigger::Auto).await;
                    }
                }
            }
        }

        tracing::debug!(target: "funnel::autosave", "Scheduler stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Touch => {
                self.state.dirty = true;
                if self.state.enabled {
                    // A backoff retry may already hold the deadline.
                    if self.deadline.is_none() {
                        self.arm(self.interval);
                        tracing::debug!(
                            target: "funnel::autosave",
                            "Autosave armed for {}ms",
                            self.interval.as_millis()
                        );
                    }
                    self.state.status = AutoSaveStatus::Pending;
                }
                self.publish();
            }
            Command::SaveNow(reply) => {
                self.deadline = None;
                let result = self.run_save(SaveTrigger::Manual).await;
                let _ = reply.send(result);
            }
            Command::Configure { enabled, interval } => {
                if let Some(interval) = interval {
                    self.interval = interval;
                    self.state.interval_ms = interval.as_millis() as u64;
                }
                if let Some(enabled) = enabled {
                    self.state.enabled = enabled;
                }
                if !self.state.enabled {
                    self.deadline = None;
                    if self.state.status == AutoSaveStatus::Pending {
                        self.state.status = AutoSaveStatus::Idle;
                    }
                } else if self.state.dirty && self.deadline.is_none() {
                    self.arm(self.interval);
                    self.state.status = AutoSaveStatus::Pending;
                }
                self.publish();
            }
            Command::SetUnsynced(unsynced) => {
                self.state.unsynced = unsynced;
                self.publish();
            }
        }
    }

    async fn run_save(&mut self, trigger: SaveTrigger) -> Result<SaveOutcome> {
        self.state.dirty = false;
        self.state.status = AutoSaveStatus::Saving;
        self.publish();

        let result = self.handler.save(trigger).await;
        match &result {
            Ok(outcome) => {
                self.backoff.reset();
                self.state.status = AutoSaveStatus::Saved;
                self.state.last_saved_at = Some(outcome.saved_at);
                self.state.last_error = outcome.partial_error.clone();
                self.state.unsynced = outcome.unsynced;
                tracing::info!(
                    target: "funnel::autosave",
                    "Saved version {} ({:?}{})",
                    outcome.version,
                    trigger,
                    if outcome.unsynced { ", unsynced" } else { "" }
                );
            }
            Err(e) => {
                self.state.status = AutoSaveStatus::Error;
                self.state.last_error = Some(e.clone());
                self.state.unsynced = true;
                self.state.dirty = true;
                if self.state.enabled {
                    let delay = self.backoff.next_delay();
                    self.arm(delay);
                    tracing::warn!(
                        target: "funnel::autosave",
                        "{:?} save failed: {}; retrying in {}ms",
                        trigger,
                        e,
                        delay.as_millis()
                    );
                } else {
                    tracing::warn!(target: "funnel::autosave", "{:?} save failed: {}", trigger, e);
                }
            }
        }
        self.publish();

        // Saved and Error are announced once, then the scheduler rests.
        self.state.status = AutoSaveStatus::Idle;
        self.publish();

        match (trigger, result) {
            (SaveTrigger::Manual, Ok(outcome)) => match &outcome.partial_error {
                Some(e) => Err(e.clone()),
                None => Ok(outcome),
            },
            (_, result) => result,
        }
    }

    fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    fn publish(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.publisher.send_replace(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Counts saves and records the document text visible at save time.
    #[derive(Default)]
    struct RecordingHandler {
        document: Mutex<String>,
        saved: Mutex<Vec<String>>,
        version: AtomicU64,
        failures_left: AtomicUsize,
        delay: Mutex<Option<Duration>>,
    }

    impl RecordingHandler {
        fn edit(&self, text: &str) {
            *self.document.lock() = text.to_string();
        }

        fn saves(&self) -> Vec<String> {
            self.saved.lock().clone()
        }
    }

    #[async_trait]
    impl SaveHandler for RecordingHandler {
        async fn save(&self, _trigger: SaveTrigger) -> Result<SaveOutcome> {
            let snapshot = self.document.lock().clone();
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(FunnelError::StorageFull {
                    needed: 10,
                    quota: 1,
                });
            }
            self.saved.lock().push(snapshot);
            Ok(SaveOutcome {
                version: self.version.fetch_add(1, Ordering::SeqCst) + 1,
                saved_at: Utc::now(),
                unsynced: false,
                partial_error: None,
            })
        }
    }

    fn config(debounce_ms: u64) -> AutoSaveConfig {
        AutoSaveConfig {
            enabled: true,
            debounce_ms,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
        }
    }

    fn spawn(handler: &Arc<RecordingHandler>, debounce_ms: u64) -> AutoSaveScheduler {
        AutoSaveScheduler::spawn(handler.clone(), &config(debounce_ms), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_saves_once() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = spawn(&handler, 10_000);

        for i in 0..5 {
            handler.edit(&format!("edit {i}"));
            scheduler.touch();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(handler.saves(), vec!["edit 4".to_string()]);
        let state = scheduler.state();
        assert_eq!(state.status, AutoSaveStatus::Idle);
        assert!(state.last_saved_at.is_some());
        assert!(!state.dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_counts_from_first_mutation() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = spawn(&handler, 10_000);

        handler.edit("first");
        scheduler.touch();
        tokio::time::sleep(Duration::from_secs(2)).await;
        handler.edit("second");
        scheduler.touch();

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(handler.saves().is_empty());
        assert_eq!(scheduler.state().status, AutoSaveStatus::Pending);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handler.saves(), vec!["second".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_flushes_pending_timer() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = spawn(&handler, 10_000);

        handler.edit("draft");
        scheduler.touch();
        let outcome = scheduler.save_now().await.unwrap();
        assert_eq!(outcome.version, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handler.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_during_save_rearms_after_completion() {
        let handler = Arc::new(RecordingHandler::default());
        *handler.delay.lock() = Some(Duration::from_secs(3));
        let scheduler = spawn(&handler, 1_000);

        handler.edit("one");
        scheduler.touch();
        // Save starts at t=1s and runs until t=4s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(scheduler.state().is_saving());
        handler.edit("two");
        scheduler.touch();

        tokio::time::sleep(Duration::from_millis(2_600)).await;
        assert_eq!(handler.saves(), vec!["one".to_string()]);
        assert_eq!(scheduler.state().status, AutoSaveStatus::Pending);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handler.saves(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_autosave_only_marks_dirty() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = spawn(&handler, 1_000);
        scheduler.set_enabled(false);

        scheduler.touch();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(handler.saves().is_empty());
        let state = scheduler.state();
        assert!(state.dirty);
        assert!(!state.enabled);
        assert_eq!(state.status, AutoSaveStatus::Idle);

        scheduler.save_now().await.unwrap();
        assert_eq!(handler.saves().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenabling_arms_for_dirty_document() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = spawn(&handler, 1_000);
        scheduler.set_enabled(false);
        scheduler.touch();
        tokio::time::sleep(Duration::from_secs(5)).await;

        scheduler.set_interval(Duration::from_millis(500));
        scheduler.set_enabled(true);
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(handler.saves().len(), 1);
        assert_eq!(scheduler.state().interval_ms, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_autosave_retries_with_backoff() {
        let handler = Arc::new(RecordingHandler::default());
        handler.failures_left.store(2, Ordering::SeqCst);
        let scheduler = spawn(&handler, 1_000);

        scheduler.touch();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let state = scheduler.state();
        assert_eq!(state.status, AutoSaveStatus::Idle);
        assert!(state.dirty);
        assert!(state.last_error.as_ref().is_some_and(|e| e.is_storage_full()));
        assert!(state.unsynced);

        // First retry after 2s fails again, second after a further 4s succeeds.
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(handler.saves().is_empty());
        tokio::time::sleep(Duration::from_millis(4_000)).await;

        assert_eq!(handler.saves().len(), 1);
        let state = scheduler.state();
        assert_eq!(state.status, AutoSaveStatus::Idle);
        assert!(state.last_error.is_none());
        assert!(!state.unsynced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_reports_failure() {
        let handler = Arc::new(RecordingHandler::default());
        handler.failures_left.store(1, Ordering::SeqCst);
        let scheduler = spawn(&handler, 10_000);

        let err = scheduler.save_now().await.unwrap_err();

        assert!(err.is_storage_full());
        assert_eq!(scheduler.state().status, AutoSaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_during_backoff_shows_pending() {
        let handler = Arc::new(RecordingHandler::default());
        handler.failures_left.store(1, Ordering::SeqCst);
        let scheduler = spawn(&handler, 1_000);

        scheduler.touch();
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(scheduler.state().status, AutoSaveStatus::Idle);

        handler.edit("retry me");
        scheduler.touch();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.state().status, AutoSaveStatus::Pending);

        // The retry keeps its 2s backoff deadline rather than a fresh debounce.
        tokio::time::sleep(Duration::from_millis(1_400)).await;
        assert!(handler.saves().is_empty());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(handler.saves(), vec!["retry me".to_string()]);
        assert_eq!(scheduler.state().status, AutoSaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_timer() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = spawn(&handler, 1_000);
        let mut states = scheduler.subscribe();

        scheduler.touch();
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.shutdown().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(handler.saves().is_empty());
        states.borrow_and_update();
        assert!(states.changed().await.is_err());
        assert!(matches!(
            scheduler.save_now().await.unwrap_err(),
            FunnelError::SessionClosed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_save() {
        let handler = Arc::new(RecordingHandler::default());
        *handler.delay.lock() = Some(Duration::from_secs(2));
        let scheduler = spawn(&handler, 100);

        handler.edit("in flight");
        scheduler.touch();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(scheduler.state().is_saving());

        scheduler.shutdown().await;

        assert_eq!(handler.saves(), vec!["in flight".to_string()]);
        // State updates after teardown are suppressed.
        assert!(scheduler.state().is_saving());
    }
}
