//! In-memory implementation of every storage trait.
//!
//! Backs the test suites and embedded use. Writes can be made to fail on
//! demand to exercise the optimistic-update paths of the editor and the
//! canvas session.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::cell::GridItem;
use crate::ids::{CellId, ProjectId, SectionId};
use crate::snapshot::CanvasSnapshot;
use crate::store::{CellStore, ImageStore, SnapshotStore, StoreError};

pub const DEFAULT_PUBLIC_BASE_URL: &str = "memory://images";

type SectionKey = (ProjectId, SectionId);

pub struct MemoryStore {
    cells: RwLock<HashMap<SectionKey, BTreeMap<CellId, GridItem>>>,
    snapshots: RwLock<HashMap<ProjectId, CanvasSnapshot>>,
    images: RwLock<HashMap<String, Vec<u8>>>,
    public_base_url: String,
    /// Number of upcoming writes to reject.
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_PUBLIC_BASE_URL)
    }

    pub fn with_base_url(base: impl Into<String>) -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            images: RwLock::new(HashMap::new()),
            public_base_url: base.into(),
            fail_next: AtomicUsize::new(0),
            fail_all: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Reject the next `count` write calls.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Reject every write until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Successful write calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub async fn cell(&self, project: ProjectId, section: &SectionId, id: CellId) -> Option<GridItem> {
        let cells = self.cells.read().await;
        cells
            .get(&(project, section.clone()))
            .and_then(|section| section.get(&id))
            .cloned()
    }

    pub async fn cell_count(&self, project: ProjectId, section: &SectionId) -> usize {
        let cells = self.cells.read().await;
        cells.get(&(project, section.clone())).map_or(0, BTreeMap::len)
    }

    pub async fn image(&self, path: &str) -> Option<Vec<u8>> {
        self.images.read().await.get(path).cloned()
    }

    fn check_write(&self, what: &str) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected(format!("{what} (store offline)")));
        }
        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StoreError::Rejected(format!("{what} (injected failure)")));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CellStore for MemoryStore {
    async fn read_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
    ) -> Result<Vec<GridItem>, StoreError> {
        let cells = self.cells.read().await;
        Ok(cells
            .get(&(project, section.clone()))
            .map(|section| section.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        cells: &[GridItem],
    ) -> Result<(), StoreError> {
        self.check_write("upsert_cells")?;
        let mut all = self.cells.write().await;
        let stored = all.entry((project, section.clone())).or_default();
        for cell in cells {
            stored.insert(cell.id, cell.clone());
        }
        log::trace!("Upserted {} cells into {}/{}", cells.len(), project, section);
        Ok(())
    }

    async fn delete_cells(
        &self,
        project: ProjectId,
        section: &SectionId,
        ids: &[CellId],
    ) -> Result<(), StoreError> {
        self.check_write("delete_cells")?;
        let mut all = self.cells.write().await;
        if let Some(stored) = all.get_mut(&(project, section.clone())) {
            for id in ids {
                stored.remove(id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn read_snapshot(
        &self,
        project: ProjectId,
    ) -> Result<Option<CanvasSnapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(&project).cloned())
    }

    async fn write_snapshot(
        &self,
        project: ProjectId,
        snapshot: &CanvasSnapshot,
    ) -> Result<(), StoreError> {
        self.check_write("write_snapshot")?;
        self.snapshots.write().await.insert(project, snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn upload_image(&self, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        self.check_write("upload_image")?;
        self.images.write().await.insert(path.to_string(), bytes);
        Ok(format!("{}/{}", self.public_base_url, path))
    }
}
