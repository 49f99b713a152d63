//! Collaborative whiteboard sync.
//!
//! ```text
//!  local_edit ──▶ state (watch) ──▶ TrailingThrottle ──▶ save():
//!                                                        write_snapshot
//!                                                        └─▶ publish envelope
//!                                                               │
//!  ┌────────────────────────── canvas:{project} ◀──────────────┘
//!  │
//!  └──▶ listener: origin == own session? ──yes──▶ ignore (echo)
//!                                        └─no──▶ replace state wholesale
//! ```
//!
//! Last broadcast wins. There are no clocks and no merging: whatever
//! snapshot arrives last replaces the local one, and applying a remote
//! snapshot never triggers a save.

use folio_core::{CanvasSnapshot, ProjectId, PubSub, SessionId, SnapshotStore, StoreError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::protocol::{canvas_topic, CanvasEnvelope, ProtocolError};
use crate::throttle::TrailingThrottle;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct CanvasConfig {
    /// Trailing-edge save window.
    pub save_interval: Duration,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_millis(1000),
        }
    }
}

impl CanvasConfig {
    pub fn for_testing() -> Self {
        Self {
            save_interval: Duration::from_millis(50),
        }
    }
}

/// What happened to a received broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    Applied,
    /// Our own save coming back.
    Echo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub saves: u64,
    pub failed_saves: u64,
    pub remote_applied: u64,
    pub echoes_ignored: u64,
}

#[derive(Default)]
struct SyncCounters {
    saves: AtomicU64,
    failed_saves: AtomicU64,
    remote_applied: AtomicU64,
    echoes_ignored: AtomicU64,
}

struct Shared {
    project: ProjectId,
    session_id: SessionId,
    topic: String,
    store: Arc<dyn SnapshotStore>,
    pubsub: Arc<dyn PubSub>,
    state: watch::Sender<Arc<CanvasSnapshot>>,
    /// Saves in flight; a throttle flush may overlap `save_now`.
    saving: AtomicUsize,
    counters: SyncCounters,
}

/// Holds one count in `Shared::saving` until dropped.
struct SavingGuard<'a>(&'a AtomicUsize);

impl<'a> SavingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    async fn reload(&self) -> Result<bool, SyncError> {
        match self.store.read_snapshot(self.project).await? {
            Some(snapshot) => {
                self.state.send_replace(Arc::new(snapshot));
                log::info!("Loaded canvas for project {}", self.project);
                Ok(true)
            }
            None => {
                log::debug!("No stored canvas for project {}", self.project);
                Ok(false)
            }
        }
    }

    async fn save(&self) -> Result<(), SyncError> {
        let result = {
            let _saving = SavingGuard::enter(&self.saving);
            let snapshot = Arc::clone(&self.state.borrow());
            self.persist_and_publish(&snapshot).await
        };

        match &result {
            Ok(()) => {
                self.counters.saves.fetch_add(1, Ordering::Relaxed);
                log::debug!("Saved canvas for project {}", self.project);
            }
            Err(e) => {
                self.counters.failed_saves.fetch_add(1, Ordering::Relaxed);
                log::error!("Saving canvas for project {} failed: {}", self.project, e);
            }
        }
        result
    }

    async fn persist_and_publish(&self, snapshot: &CanvasSnapshot) -> Result<(), SyncError> {
        self.store.write_snapshot(self.project, snapshot).await?;
        let envelope = CanvasEnvelope::new(snapshot, self.session_id)?;
        let receivers = self.pubsub.publish(&self.topic, envelope.encode()?)?;
        log::trace!("Published canvas on {} to {} receivers", self.topic, receivers);
        Ok(())
    }

    fn receive(&self, bytes: &[u8]) -> Result<Reception, SyncError> {
        let envelope = CanvasEnvelope::decode(bytes)?;
        if envelope.is_from(self.session_id) {
            self.counters.echoes_ignored.fetch_add(1, Ordering::Relaxed);
            return Ok(Reception::Echo);
        }
        let snapshot = envelope.snapshot()?;
        self.state.send_replace(Arc::new(snapshot));
        self.counters.remote_applied.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Applied remote canvas from session {} on {}",
            envelope.origin_session_id,
            self.topic
        );
        Ok(Reception::Applied)
    }
}

// ───────────────────────────────────────────────────────────────────
// CanvasSync
// ───────────────────────────────────────────────────────────────────

/// Sync session for one project's whiteboard.
pub struct CanvasSync {
    shared: Arc<Shared>,
    config: CanvasConfig,
}

impl CanvasSync {
    pub fn new(
        project: ProjectId,
        store: Arc<dyn SnapshotStore>,
        pubsub: Arc<dyn PubSub>,
        config: CanvasConfig,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(CanvasSnapshot::empty()));
        let session_id = SessionId::random();
        log::debug!("Canvas session {} for project {}", session_id, project);
        Self {
            shared: Arc::new(Shared {
                project,
                session_id,
                topic: canvas_topic(project),
                store,
                pubsub,
                state,
                saving: AtomicUsize::new(0),
                counters: SyncCounters::default(),
            }),
            config,
        }
    }

    pub fn project(&self) -> ProjectId {
        self.shared.project
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn snapshot(&self) -> Arc<CanvasSnapshot> {
        self.shared.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<CanvasSnapshot>> {
        self.shared.state.subscribe()
    }

    /// True while a save is in flight.
    pub fn is_saving(&self) -> bool {
        self.shared.saving.load(Ordering::SeqCst) > 0
    }

    pub fn stats(&self) -> SyncStats {
        let c = &self.shared.counters;
        SyncStats {
            saves: c.saves.load(Ordering::Relaxed),
            failed_saves: c.failed_saves.load(Ordering::Relaxed),
            remote_applied: c.remote_applied.load(Ordering::Relaxed),
            echoes_ignored: c.echoes_ignored.load(Ordering::Relaxed),
        }
    }

    /// Replace local state with the latest persisted snapshot, if any.
    pub async fn reload(&self) -> Result<bool, SyncError> {
        self.shared.reload().await
    }

    /// Persist and broadcast the current state right away.
    pub async fn save_now(&self) -> Result<(), SyncError> {
        self.shared.save().await
    }

    /// Handle one broadcast payload.
    pub fn receive(&self, bytes: &[u8]) -> Result<Reception, SyncError> {
        self.shared.receive(bytes)
    }

    /// Reload, subscribe to the project topic and start listening.
    ///
    /// Subscribing happens before the reload so that nothing published in
    /// between is missed.
    pub async fn mount(&self) -> Result<MountedCanvas, SyncError> {
        let mut subscription = self.shared.pubsub.subscribe(&self.shared.topic);
        self.shared.reload().await?;

        let shared = self.shared.clone();
        let listener = tokio::spawn(async move {
            while let Some(bytes) = subscription.recv().await {
                if let Err(e) = shared.receive(&bytes) {
                    log::warn!("Dropping malformed canvas message on {}: {}", shared.topic, e);
                }
            }
            log::debug!("Canvas topic {} closed", shared.topic);
        });

        let shared = self.shared.clone();
        let throttle = TrailingThrottle::spawn(self.config.save_interval, move || {
            let shared = shared.clone();
            async move {
                // Failures are logged and counted inside save().
                let _ = shared.save().await;
            }
        });

        log::info!(
            "Mounted canvas for project {} (session {})",
            self.shared.project,
            self.shared.session_id
        );
        Ok(MountedCanvas {
            shared: self.shared.clone(),
            listener,
            throttle: Some(throttle),
        })
    }
}

// ───────────────────────────────────────────────────────────────────
// MountedCanvas
// ───────────────────────────────────────────────────────────────────

/// Live canvas session. Dropping it unsubscribes and stops the throttle;
/// a save already in flight or a window already open still completes.
pub struct MountedCanvas {
    shared: Arc<Shared>,
    listener: JoinHandle<()>,
    throttle: Option<TrailingThrottle>,
}

impl MountedCanvas {
    /// Replace local state with a user edit and schedule a save.
    pub fn local_edit(&self, snapshot: CanvasSnapshot) -> bool {
        self.shared.state.send_replace(Arc::new(snapshot));
        self.throttle.as_ref().is_some_and(TrailingThrottle::trigger)
    }

    /// The active project changed underneath this session: reload.
    pub async fn project_changed(&self) -> Result<bool, SyncError> {
        self.shared.reload().await
    }

    pub fn snapshot(&self) -> Arc<CanvasSnapshot> {
        self.shared.state.borrow().clone()
    }

    pub fn is_saving(&self) -> bool {
        self.shared.saving.load(Ordering::SeqCst) > 0
    }

    pub fn save_count(&self) -> u64 {
        self.throttle.as_ref().map_or(0, TrailingThrottle::flush_count)
    }

    pub fn unmount(self) {}
}

impl Drop for MountedCanvas {
    fn drop(&mut self) {
        self.listener.abort();
        // Dropping the throttle closes its trigger channel.
        self.throttle.take();
        log::info!("Unmounted canvas for project {}", self.shared.project);
    }
}
