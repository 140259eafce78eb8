//! Debounced save worker.
//!
//! All writes for one dialog go through a single worker task, so saves never
//! overlap and at most one debounce timer is pending. A triggering change
//! replaces the pending snapshot and pushes the deadline out; when the
//! deadline passes only the latest snapshot is written.
//!
//! Dropping the scheduler closes the channel; the worker then writes any
//! pending snapshot before exiting.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::policy::SavePolicy;
use crate::backend::DialogBackend;
use crate::canonical::canonical_hash;
use crate::graph::ChangeKind;
use crate::types::PersistedDialog;

/// Error returned to callers awaiting a save.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// The backend rejected the write.
    #[error("Backend error: {0}")]
    Backend(String),
    /// The worker task is gone.
    #[error("Persistence worker stopped")]
    Stopped,
}

impl PersistenceError {
    /// Wrap a backend error.
    pub fn from_backend(e: impl std::fmt::Display) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Counters and last failure of the save worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStatus {
    /// Snapshots written to the backend.
    pub saves_written: u64,
    /// Debounced snapshots skipped as identical to the last write.
    pub saves_skipped: u64,
    /// Whether a debounced snapshot is waiting for its deadline.
    pub pending: bool,
    /// Message of the most recent failed debounced save, cleared by the next
    /// successful write.
    pub last_error: Option<String>,
}

enum SaveRequest {
    Schedule(PersistedDialog),
    Flush {
        snapshot: Option<PersistedDialog>,
        reply: oneshot::Sender<Result<(), PersistenceError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<(), PersistenceError>>,
    },
}

/// Handle to the save worker of one dialog.
#[derive(Debug)]
pub struct PersistenceScheduler {
    tx: mpsc::UnboundedSender<SaveRequest>,
    policy: SavePolicy,
    status: Arc<Mutex<SchedulerStatus>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SaveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schedule(d) => f.debug_tuple("Schedule").field(&d.id).finish(),
            Self::Flush { snapshot, .. } => f
                .debug_struct("Flush")
                .field("snapshot", &snapshot.as_ref().map(|d| &d.id))
                .finish(),
            Self::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

impl PersistenceScheduler {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<B>(backend: Arc<B>, project_id: impl Into<String>, policy: SavePolicy) -> Self
    where
        B: DialogBackend + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(SchedulerStatus::default()));
        let worker = SaveWorker {
            backend,
            project_id: project_id.into(),
            debounce: policy.debounce(),
            status: Arc::clone(&status),
            last_written: None,
        };
        let worker = tokio::spawn(worker.run(rx));
        Self {
            tx,
            policy,
            status,
            worker: Some(worker),
        }
    }

    /// Policy in effect.
    pub fn policy(&self) -> &SavePolicy {
        &self.policy
    }

    /// Snapshot of the worker's counters.
    pub fn status(&self) -> SchedulerStatus {
        self.status.lock().clone()
    }

    /// Report a mutation. If the policy triggers on `kind`, the snapshot is
    /// built and handed to the worker. Returns whether a save was scheduled.
    pub fn notify(&self, kind: ChangeKind, snapshot: impl FnOnce() -> PersistedDialog) -> bool {
        if !self.policy.triggers(kind) {
            return false;
        }
        let snapshot = snapshot();
        debug!(dialog_id = %snapshot.id, %kind, "Save scheduled");
        if self.tx.send(SaveRequest::Schedule(snapshot)).is_err() {
            warn!(%kind, "Persistence worker stopped, change not scheduled");
            return false;
        }
        true
    }

    /// Write `snapshot` now, cancelling any pending debounced save.
    pub async fn save(&self, snapshot: PersistedDialog) -> Result<(), PersistenceError> {
        self.request_flush(Some(snapshot)).await
    }

    /// Write the pending debounced snapshot now, if there is one.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        self.request_flush(None).await
    }

    async fn request_flush(&self, snapshot: Option<PersistedDialog>) -> Result<(), PersistenceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SaveRequest::Flush { snapshot, reply })
            .map_err(|_| PersistenceError::Stopped)?;
        rx.await.map_err(|_| PersistenceError::Stopped)?
    }

    /// Flush pending work and stop the worker.
    pub async fn shutdown(mut self) -> Result<(), PersistenceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SaveRequest::Shutdown { reply })
            .map_err(|_| PersistenceError::Stopped)?;
        let result = rx.await.map_err(|_| PersistenceError::Stopped)?;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(error = %e, "Persistence worker panicked");
            }
        }
        result
    }
}

struct SaveWorker<B> {
    backend: Arc<B>,
    project_id: String,
    debounce: Duration,
    status: Arc<Mutex<SchedulerStatus>>,
    /// Fingerprint of the last snapshot written.
    last_written: Option<u64>,
}

impl<B: DialogBackend> SaveWorker<B> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SaveRequest>) {
        let mut pending: Option<PersistedDialog> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(SaveRequest::Schedule(snapshot)) => {
                        if self.debounce.is_zero() {
                            self.write_debounced(snapshot).await;
                        } else {
                            pending = Some(snapshot);
                            deadline = Some(Instant::now() + self.debounce);
                            self.status.lock().pending = true;
                        }
                    }
                    Some(SaveRequest::Flush { snapshot, reply }) => {
                        deadline = None;
                        let stale = pending.take();
                        self.status.lock().pending = false;
                        let result = match snapshot.or(stale) {
                            Some(snapshot) => self.write(&snapshot).await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    Some(SaveRequest::Shutdown { reply }) => {
                        let result = match pending.take() {
                            Some(snapshot) => self.write(&snapshot).await,
                            None => Ok(()),
                        };
                        self.status.lock().pending = false;
                        let _ = reply.send(result);
                        break;
                    }
                    None => {
                        if let Some(snapshot) = pending.take() {
                            debug!(dialog_id = %snapshot.id, "Flushing pending save on teardown");
                            self.write_debounced(snapshot).await;
                        }
                        self.status.lock().pending = false;
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.status.lock().pending = false;
                    if let Some(snapshot) = pending.take() {
                        self.write_debounced(snapshot).await;
                    }
                }
            }
        }
    }

    /// Debounced writes skip unchanged snapshots and only log failures.
    async fn write_debounced(&mut self, snapshot: PersistedDialog) {
        if let (Some(last), Ok(hash)) = (self.last_written, canonical_hash(&snapshot)) {
            if last == hash {
                debug!(dialog_id = %snapshot.id, "Snapshot unchanged, skipping save");
                self.status.lock().saves_skipped += 1;
                return;
            }
        }
        if let Err(e) = self.write(&snapshot).await {
            warn!(dialog_id = %snapshot.id, error = %e, "Debounced save failed");
        }
    }

    async fn write(&mut self, snapshot: &PersistedDialog) -> Result<(), PersistenceError> {
        match self.backend.save_dialog(&self.project_id, snapshot).await {
            Ok(()) => {
                self.last_written = canonical_hash(snapshot).ok();
                let mut status = self.status.lock();
                status.saves_written += 1;
                status.last_error = None;
                debug!(dialog_id = %snapshot.id, nodes = snapshot.nodes.len(), "Dialog saved");
                Ok(())
            }
            Err(e) => {
                let error = PersistenceError::from_backend(&e);
                self.status.lock().last_error = Some(error.to_string());
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use chrono::{TimeZone, Utc};

    fn snapshot(name: &str) -> PersistedDialog {
        let mut dialog = PersistedDialog::new("d1", name, None);
        dialog.created_at = Utc.timestamp_opt(0, 0).unwrap();
        dialog
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::default());

        for name in ["one", "two", "three"] {
            assert!(scheduler.notify(ChangeKind::Structural, || snapshot(name)));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert_eq!(backend.save_count(), 0);
        assert!(scheduler.status().pending);

        tokio::time::sleep(Duration::from_millis(800)).await;
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].name, "three");
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_changes_do_not_trigger() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::default());

        assert!(!scheduler.notify(ChangeKind::Position, || snapshot("moved")));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_debounce_saves_immediately() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::immediate());

        scheduler.notify(ChangeKind::Content, || snapshot("a"));
        scheduler.notify(ChangeKind::Content, || snapshot("b"));
        scheduler.flush().await.unwrap();
        assert_eq!(backend.save_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_save_cancels_pending() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::default());

        scheduler.notify(ChangeKind::Structural, || snapshot("draft"));
        scheduler.save(snapshot("final")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].name, "final");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_snapshot_skipped() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::default());

        scheduler.save(snapshot("same")).await.unwrap();
        scheduler.notify(ChangeKind::Content, || snapshot("same"));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(backend.save_count(), 1);
        assert_eq!(scheduler.status().saves_skipped, 1);

        // Explicit saves always write.
        scheduler.save(snapshot("same")).await.unwrap();
        assert_eq!(backend.save_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_surface_and_are_recorded() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::default());
        backend.set_unavailable(true);

        let result = scheduler.save(snapshot("x")).await;
        assert_eq!(result, Err(PersistenceError::Backend("Backend unavailable".to_string())));

        scheduler.notify(ChangeKind::Structural, || snapshot("y"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.status().last_error.as_deref(), Some("Backend error: Backend unavailable"));

        backend.set_unavailable(false);
        scheduler.notify(ChangeKind::Structural, || snapshot("z"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.status().last_error, None);
        assert_eq!(backend.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = PersistenceScheduler::spawn(Arc::clone(&backend), "p", SavePolicy::default());

        scheduler.notify(ChangeKind::Structural, || snapshot("unsaved"));
        scheduler.shutdown().await.unwrap();

        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].name, "unsaved");
    }
}
