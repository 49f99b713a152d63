//! Persistence and messaging adapters.
//!
//! The editor and the canvas session only ever talk to these traits. The
//! workspace ships two implementations: [`crate::memory::MemoryStore`] for
//! tests and embedding, and the RocksDB `ProjectStore` in `folio-collab`.
//! Pub/sub is implemented by the in-process `TopicBus` and the WebSocket
//! `RelayClient`.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::cell::GridItem;
use crate::ids::{CellId, ProjectId, SectionId};
use crate::snapshot::CanvasSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

// ───────────────────────────────────────────────────────────────────
// Storage traits
// ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CellStore: Send + Sync {
    /// All stored cells of a section, in any order.
    async fn read_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
    ) -> Result<Vec<GridItem>, StoreError>;

    /// Insert or replace cells. Idempotent on (project, section, id).
    async fn upsert_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        cells: &[GridItem],
    ) -> Result<(), StoreError>;

    async fn delete_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        ids: &[CellId],
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn read_snapshot(&self, project: ProjectId)
        -> Result<Option<CanvasSnapshot>, StoreError>;

    async fn write_snapshot(
        &self,
        project: ProjectId,
        snapshot: &CanvasSnapshot,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `bytes` under `path` and return the URL clients load it from.
    async fn upload_image(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError>;
}

// ───────────────────────────────────────────────────────────────────
// Pub/sub
// ───────────────────────────────────────────────────────────────────

/// Topic-addressed fan-out of opaque byte messages.
///
/// Delivery goes to every subscriber of the topic, the publisher included.
pub trait PubSub: Send + Sync {
    /// Returns how many receivers the message was handed to.
    fn publish(&self, topic: &str, message: Vec<u8>) -> Result<usize, StoreError>;

    fn subscribe(&self, topic: &str) -> Subscription;
}

/// Live subscription to one topic. Dropping it unsubscribes.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<Arc<Vec<u8>>>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, receiver: broadcast::Receiver<Arc<Vec<u8>>>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
            on_release: None,
        }
    }

    /// Run `release` once when this subscription is dropped.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the topic is gone.
    ///
    /// A lagging receiver skips the overwritten messages and keeps going.
    pub async fn recv(&mut self) -> Option<Arc<Vec<u8>>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Subscription to {} lagged, skipped {} messages", self.topic, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}
