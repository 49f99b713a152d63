//! Grid Editor Engine.
//!
//! `GridEditor` owns the materialized cells of one (project, section) pair,
//! the selection, and the per-cell image frames. Every mutation goes through
//! one of two write protocols:
//!
//! ```text
//!  optimistic (content, template, reset, image transform, paste)
//!  ───────────────────────────────────────────────────────────────
//!    mutate local ──▶ notify ──▶ upsert ──┬─ ok ──▶ WriteOutcome::Saved
//!                                         └─ err ─▶ log, mark unsaved,
//!                                                   WriteOutcome::Unsaved
//!
//!  confirmed (merge, unmerge, add/remove row)
//!  ───────────────────────────────────────────────────────────────
//!    validate ──▶ write ──┬─ ok ──▶ mutate local ──▶ notify
//!                         └─ err ─▶ EditError::Persist, nothing changes
//! ```
//!
//! Listeners observe changes through [`GridEditor::subscribe`].

use folio_core::{
    cell_id, checked_cell_id, CellId, CellStore, GridItem, HorizontalAlign, ImageStore,
    ProjectId, SectionId, StoreError, TemplateType, TextField, TextStyle, VerticalAlign,
    MAX_ROWS, MERGE_MARKER, MIN_ROWS, NUM_COLS,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::clipboard::{extension_for_mime, image_url, ClipboardPayload};
use crate::error::EditError;
use crate::layout::SectionLayout;
use crate::merge::{plan_merge, plan_unmerge};
use crate::selection::{Selection, SelectionState};
use crate::transform::{ImageFrame, Offset, Size, TransformCommit, TransformLimits};

// ───────────────────────────────────────────────────────────────────
// Configuration & results
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Rows shown for a section with no stored cells.
    pub initial_rows: u32,
    /// Capacity of the change-notification channel.
    pub event_capacity: usize,
    pub limits: TransformLimits,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            initial_rows: 3,
            event_capacity: 256,
            limits: TransformLimits::default(),
        }
    }
}

impl EditorConfig {
    pub fn for_testing() -> Self {
        Self {
            initial_rows: MIN_ROWS,
            event_capacity: 64,
            limits: TransformLimits::default(),
        }
    }
}

/// Result of an optimistic write. The local change stands either way.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Saved,
    Unsaved(StoreError),
}

impl WriteOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, WriteOutcome::Saved)
    }
}

/// Per-cell results of a sequential batch write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub saved: Vec<CellId>,
    pub failed: Vec<(CellId, StoreError)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    Loaded { rows: u32, backfilled: usize },
    CellsChanged(Vec<CellId>),
    RowsChanged(u32),
    SelectionChanged(SelectionState),
    /// Live drag frame; never persisted.
    ImagePreview { cell: CellId, offset: Offset },
    PersistFailed { cells: Vec<CellId>, error: StoreError },
}

/// Handle for an in-flight upload started with [`GridEditor::start_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    cell: CellId,
    token: Uuid,
}

impl UploadTicket {
    pub fn cell(&self) -> CellId {
        self.cell
    }
}

// ───────────────────────────────────────────────────────────────────
// GridEditor
// ───────────────────────────────────────────────────────────────────

pub struct GridEditor {
    project: ProjectId,
    section: SectionId,
    config: EditorConfig,

    cells: BTreeMap<CellId, GridItem>,
    rows: u32,
    selection: Selection,
    frames: HashMap<CellId, ImageFrame>,
    uploads: HashMap<CellId, Uuid>,
    /// Cells whose last write failed.
    unsaved: BTreeSet<CellId>,

    store: Arc<dyn CellStore>,
    images: Arc<dyn ImageStore>,
    events: broadcast::Sender<GridEvent>,
}

impl GridEditor {
    pub fn new(
        project: ProjectId,
        section: SectionId,
        store: Arc<dyn CellStore>,
        images: Arc<dyn ImageStore>,
        config: EditorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            project,
            section,
            rows: config.initial_rows.clamp(MIN_ROWS, MAX_ROWS),
            config,
            cells: BTreeMap::new(),
            selection: Selection::new(),
            frames: HashMap::new(),
            uploads: HashMap::new(),
            unsaved: BTreeSet::new(),
            store,
            images,
            events,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn project(&self) -> ProjectId {
        self.project
    }

    pub fn section(&self) -> &SectionId {
        &self.section
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cell(&self, id: CellId) -> Option<&GridItem> {
        self.cells.get(&id)
    }

    /// All materialized cells in id order, hidden ones included.
    pub fn cells(&self) -> impl Iterator<Item = &GridItem> {
        self.cells.values()
    }

    pub fn visible_cells(&self) -> impl Iterator<Item = &GridItem> {
        self.cells.values().filter(|c| c.is_visible())
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_state(&self) -> SelectionState {
        self.selection.state()
    }

    pub fn frame(&self, id: CellId) -> Option<&ImageFrame> {
        self.frames.get(&id)
    }

    pub fn is_uploading(&self, id: CellId) -> bool {
        self.uploads.contains_key(&id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.events.subscribe()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved.is_empty()
    }

    pub fn unsaved_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.unsaved.iter().copied()
    }

    fn emit(&self, event: GridEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    fn visible_cell(&self, id: CellId) -> Result<&GridItem, EditError> {
        let cell = self.cells.get(&id).ok_or(EditError::CellNotFound(id))?;
        if cell.hidden {
            return Err(EditError::CellHidden(id));
        }
        Ok(cell)
    }

    fn frame_mut(&mut self, id: CellId) -> &mut ImageFrame {
        let limits = self.config.limits;
        let cell = self.cells.get(&id);
        self.frames.entry(id).or_insert_with(|| {
            let (offset, scale) = cell.map_or((Offset::default(), 1.0), |c| {
                (Offset::new(c.image.offset_x, c.image.offset_y), c.image.scale)
            });
            ImageFrame::new(offset, scale, limits)
        })
    }

    // ─── Load ───────────────────────────────────────────────────────

    /// Read the section from storage and backfill missing cells.
    ///
    /// Returns the number of backfilled cells.
    pub async fn load(&mut self) -> Result<usize, EditError> {
        let stored = self.store.read_cells(self.project, &self.section).await?;

        let mut cells = BTreeMap::new();
        for cell in stored {
            let in_grid = cell.row <= MAX_ROWS
                && cell.row_span <= MAX_ROWS
                && cell.col_span <= NUM_COLS
                && checked_cell_id(cell.row, cell.col) == Some(cell.id);
            if !in_grid {
                log::warn!(
                    "Skipping malformed cell {} at ({}, {}) in {}/{}",
                    cell.id, cell.row, cell.col, self.project, self.section
                );
                continue;
            }
            cells.insert(cell.id, cell);
        }

        let max_row = cells.values().map(|c| c.row).max().unwrap_or(0);
        let rows = self.config.initial_rows.clamp(MIN_ROWS, MAX_ROWS).max(max_row);

        let missing: Vec<GridItem> = GridItem::default_band(rows)
            .into_iter()
            .filter(|c| !cells.contains_key(&c.id))
            .collect();
        let backfilled = missing.len();
        let missing_ids: Vec<CellId> = missing.iter().map(|c| c.id).collect();
        for cell in &missing {
            cells.insert(cell.id, cell.clone());
        }

        self.cells = cells;
        self.rows = rows;
        self.selection.clear();
        self.frames.clear();
        self.uploads.clear();
        self.unsaved.clear();

        if !missing.is_empty() {
            if let Err(e) = self.store.upsert_cells(self.project, &self.section, &missing).await {
                log::error!(
                    "Backfill of {} cells in {}/{} failed: {}",
                    backfilled, self.project, self.section, e
                );
                self.unsaved.extend(missing_ids.iter().copied());
                self.emit(GridEvent::PersistFailed {
                    cells: missing_ids,
                    error: e,
                });
            }
        }

        log::info!(
            "Loaded section {}/{}: {} rows, {} cells ({} backfilled)",
            self.project,
            self.section,
            rows,
            self.cells.len(),
            backfilled
        );
        self.emit(GridEvent::Loaded { rows, backfilled });
        Ok(backfilled)
    }

    // ─── Persistence helpers ────────────────────────────────────────

    /// Upsert the current local state of `ids` as one batch.
    async fn persist(&mut self, ids: &[CellId]) -> WriteOutcome {
        let batch: Vec<GridItem> = ids.iter().filter_map(|id| self.cells.get(id).cloned()).collect();
        match self.store.upsert_cells(self.project, &self.section, &batch).await {
            Ok(()) => {
                for id in ids {
                    self.unsaved.remove(id);
                }
                WriteOutcome::Saved
            }
            Err(e) => {
                log::error!("Persisting cells {:?} in {}/{} failed: {}", ids, self.project, self.section, e);
                self.unsaved.extend(ids.iter().copied());
                self.emit(GridEvent::PersistFailed {
                    cells: ids.to_vec(),
                    error: e.clone(),
                });
                WriteOutcome::Unsaved(e)
            }
        }
    }

    /// Upsert each cell on its own, in order, continuing past failures.
    async fn persist_each(&mut self, ids: &[CellId]) -> BatchReport {
        let mut report = BatchReport::default();
        for &id in ids {
            match self.persist(&[id]).await {
                WriteOutcome::Saved => report.saved.push(id),
                WriteOutcome::Unsaved(e) => report.failed.push((id, e)),
            }
        }
        if !report.is_complete() {
            log::warn!(
                "Batch write in {}/{}: {} saved, {} failed",
                self.project,
                self.section,
                report.saved.len(),
                report.failed.len()
            );
        }
        report
    }

    /// Optimistic single-cell edit.
    async fn update_cell(
        &mut self,
        id: CellId,
        mutate: impl FnOnce(&mut GridItem),
    ) -> Result<WriteOutcome, EditError> {
        self.visible_cell(id)?;
        if let Some(cell) = self.cells.get_mut(&id) {
            mutate(cell);
        }
        self.emit(GridEvent::CellsChanged(vec![id]));
        Ok(self.persist(&[id]).await)
    }

    /// Re-send every cell whose last write failed.
    pub async fn retry_unsaved(&mut self) -> BatchReport {
        let ids: Vec<CellId> = self.unsaved.iter().copied().collect();
        if !ids.is_empty() {
            log::info!("Retrying {} unsaved cells in {}/{}", ids.len(), self.project, self.section);
        }
        self.persist_each(&ids).await
    }

    // ─── Selection ──────────────────────────────────────────────────

    /// Clicks on hidden or unknown cells are ignored.
    pub fn click(&mut self, id: CellId, modifier: bool) {
        if self.visible_cell(id).is_err() {
            return;
        }
        self.selection.click(id, modifier);
        self.emit(GridEvent::SelectionChanged(self.selection.state()));
    }

    pub fn context_click(&mut self, id: CellId) {
        if self.visible_cell(id).is_err() {
            return;
        }
        self.selection.context(id);
        self.emit(GridEvent::SelectionChanged(self.selection.state()));
    }

    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.emit(GridEvent::SelectionChanged(SelectionState::NoSelection));
        }
    }

    pub fn set_multi_select_mode(&mut self, on: bool) {
        self.selection.set_multi_mode(on);
    }

    // ─── Merge / unmerge ────────────────────────────────────────────

    /// Merge the selected cells into one rectangle. Returns the anchor id.
    pub async fn merge_selected(&mut self) -> Result<CellId, EditError> {
        let selected: Vec<&GridItem> = self
            .selection
            .ids()
            .map(|id| self.cells.get(&id).ok_or(EditError::CellNotFound(id)))
            .collect::<Result<_, _>>()?;
        let plan = plan_merge(&selected)?;

        let mut updated = Vec::with_capacity(plan.absorbed.len() + 1);
        if let Some(anchor) = self.cells.get(&plan.anchor) {
            let mut anchor = anchor.clone();
            anchor.row_span = plan.row_span;
            anchor.col_span = plan.col_span;
            if anchor.template == TemplateType::Text {
                anchor.text.body.content = MERGE_MARKER.to_string();
            }
            updated.push(anchor);
        }
        for id in &plan.absorbed {
            if let Some(cell) = self.cells.get(id) {
                let mut cell = cell.clone();
                cell.hidden = true;
                updated.push(cell);
            }
        }

        self.store
            .upsert_cells(self.project, &self.section, &updated)
            .await
            .inspect_err(|e| log::error!("Merge into cell {} failed: {}", plan.anchor, e))?;

        let ids: Vec<CellId> = updated.iter().map(|c| c.id).collect();
        for cell in updated {
            self.unsaved.remove(&cell.id);
            self.cells.insert(cell.id, cell);
        }
        for id in &plan.absorbed {
            self.frames.remove(id);
        }
        if let Some(frame) = self.frames.get_mut(&plan.anchor) {
            // Container changed size; wait for the next layout pass.
            frame.cancel_drag();
        }

        log::debug!(
            "Merged {} cells into {} ({}×{})",
            ids.len(),
            plan.anchor,
            plan.row_span,
            plan.col_span
        );
        self.selection.clear();
        self.emit(GridEvent::CellsChanged(ids));
        self.emit(GridEvent::SelectionChanged(SelectionState::NoSelection));
        Ok(plan.anchor)
    }

    /// Split a merged anchor back into 1×1 cells.
    pub async fn unmerge(&mut self, id: CellId) -> Result<(), EditError> {
        let anchor = self.cells.get(&id).ok_or(EditError::CellNotFound(id))?;
        let plan = plan_unmerge(anchor, self.cells.values())?;

        let mut updated = Vec::with_capacity(plan.released.len() + 1);
        let mut anchor = anchor.clone();
        anchor.row_span = 1;
        anchor.col_span = 1;
        anchor.text.body.content.clear();
        updated.push(anchor);
        for released in &plan.released {
            if let Some(cell) = self.cells.get(released) {
                let mut cell = cell.clone();
                cell.hidden = false;
                cell.row_span = 1;
                cell.col_span = 1;
                updated.push(cell);
            }
        }

        self.store
            .upsert_cells(self.project, &self.section, &updated)
            .await
            .inspect_err(|e| log::error!("Unmerge of cell {} failed: {}", id, e))?;

        let ids: Vec<CellId> = updated.iter().map(|c| c.id).collect();
        for cell in updated {
            self.unsaved.remove(&cell.id);
            self.cells.insert(cell.id, cell);
        }
        log::debug!("Unmerged cell {}, released {:?}", id, plan.released);
        self.emit(GridEvent::CellsChanged(ids));
        Ok(())
    }

    // ─── Template / reset ───────────────────────────────────────────

    pub async fn assign_template(&mut self, template: TemplateType) -> BatchReport {
        self.apply_to_selection(|cell| cell.assign_template(template)).await
    }

    pub async fn reset_selected(&mut self) -> BatchReport {
        self.apply_to_selection(GridItem::reset_content).await
    }

    async fn apply_to_selection(&mut self, mutate: impl Fn(&mut GridItem)) -> BatchReport {
        let ids: Vec<CellId> = self
            .selection
            .ids()
            .filter(|id| self.cells.contains_key(id))
            .collect();
        for id in &ids {
            if let Some(cell) = self.cells.get_mut(id) {
                mutate(cell);
            }
            self.frames.remove(id);
        }
        self.selection.clear();
        if !ids.is_empty() {
            self.emit(GridEvent::CellsChanged(ids.clone()));
            self.emit(GridEvent::SelectionChanged(SelectionState::NoSelection));
        }
        self.persist_each(&ids).await
    }

    // ─── Content edits ──────────────────────────────────────────────

    pub async fn set_text(
        &mut self,
        id: CellId,
        field: TextField,
        content: impl Into<String>,
    ) -> Result<WriteOutcome, EditError> {
        let content = content.into();
        self.update_cell(id, |c| c.text_block_mut(field).content = content).await
    }

    pub async fn set_text_visible(
        &mut self,
        id: CellId,
        field: TextField,
        visible: bool,
    ) -> Result<WriteOutcome, EditError> {
        self.update_cell(id, |c| c.text_block_mut(field).visible = visible).await
    }

    pub async fn set_font_size(
        &mut self,
        id: CellId,
        field: TextField,
        size: f32,
    ) -> Result<WriteOutcome, EditError> {
        self.update_cell(id, |c| c.text_block_mut(field).font_size = size).await
    }

    pub async fn set_font_family(
        &mut self,
        id: CellId,
        field: TextField,
        family: impl Into<String>,
    ) -> Result<WriteOutcome, EditError> {
        let family = family.into();
        self.update_cell(id, |c| c.text_block_mut(field).font_family = family).await
    }

    pub async fn set_text_style(
        &mut self,
        id: CellId,
        field: TextField,
        style: TextStyle,
        on: bool,
    ) -> Result<WriteOutcome, EditError> {
        self.update_cell(id, |c| c.text_block_mut(field).set_style(style, on)).await
    }

    pub async fn toggle_text_style(
        &mut self,
        id: CellId,
        field: TextField,
        style: TextStyle,
    ) -> Result<WriteOutcome, EditError> {
        self.update_cell(id, |c| {
            let block = c.text_block_mut(field);
            let on = !block.style(style);
            block.set_style(style, on);
        })
        .await
    }

    pub async fn set_vertical_align(
        &mut self,
        id: CellId,
        align: VerticalAlign,
    ) -> Result<WriteOutcome, EditError> {
        self.update_cell(id, |c| c.text.vertical_align = align).await
    }

    pub async fn set_horizontal_align(
        &mut self,
        id: CellId,
        align: HorizontalAlign,
    ) -> Result<WriteOutcome, EditError> {
        self.update_cell(id, |c| c.text.horizontal_align = align).await
    }

    // ─── Rows ───────────────────────────────────────────────────────

    /// Append a row of default cells. Returns the new row count.
    pub async fn add_row(&mut self) -> Result<u32, EditError> {
        if self.rows >= MAX_ROWS {
            return Err(EditError::MaxRows { max: MAX_ROWS });
        }
        let row = self.rows + 1;
        let band = GridItem::band(row);
        self.store
            .upsert_cells(self.project, &self.section, &band)
            .await
            .inspect_err(|e| log::error!("Adding row {} failed: {}", row, e))?;

        for cell in band {
            self.cells.insert(cell.id, cell);
        }
        self.rows = row;
        log::debug!("Added row {} to {}/{}", row, self.project, self.section);
        self.emit(GridEvent::RowsChanged(row));
        Ok(row)
    }

    /// Drop the last row. Returns the new row count.
    pub async fn remove_row(&mut self) -> Result<u32, EditError> {
        if self.rows <= MIN_ROWS {
            return Err(EditError::MinRows { min: MIN_ROWS });
        }
        let last = self.rows;
        let ids: Vec<CellId> = (1..=NUM_COLS).map(|col| cell_id(last, col)).collect();
        self.store
            .delete_cells(self.project, &self.section, &ids)
            .await
            .inspect_err(|e| log::error!("Removing row {} failed: {}", last, e))?;

        for id in &ids {
            self.cells.remove(id);
            self.frames.remove(id);
            self.uploads.remove(id);
            self.unsaved.remove(id);
        }
        self.rows = last - 1;
        let cells = &self.cells;
        self.selection.retain(|id| cells.get(&id).is_some_and(|c| c.is_visible()));

        // Anchors reaching into the removed row shrink to fit.
        let rows = self.rows;
        let trimmed: Vec<CellId> = self
            .cells
            .values_mut()
            .filter(|c| c.is_visible() && c.row_end() > rows)
            .map(|c| {
                c.row_span = rows - c.row + 1;
                c.id
            })
            .collect();

        log::debug!("Removed row {} from {}/{}", last, self.project, self.section);
        self.emit(GridEvent::RowsChanged(self.rows));
        if !trimmed.is_empty() {
            self.emit(GridEvent::CellsChanged(trimmed.clone()));
            self.persist(&trimmed).await;
        }
        Ok(self.rows)
    }

    // ─── Layout & image transform ───────────────────────────────────

    /// Feed laid-out cell sizes to the image frames. Offsets pushed back in
    /// bounds by a new container size are written in one batch.
    pub async fn apply_layout(&mut self, layout: &SectionLayout) -> WriteOutcome {
        let image_cells: Vec<(CellId, Size)> = self
            .cells
            .values()
            .filter(|c| c.is_visible() && c.template == TemplateType::Image)
            .filter_map(|c| layout.rect(c.id).map(|rect| (c.id, rect.size())))
            .collect();
        let moved: Vec<CellId> = image_cells
            .into_iter()
            .filter(|&(id, size)| self.resize_frame(id, size))
            .map(|(id, _)| id)
            .collect();
        self.persist_reclamped(&moved).await
    }

    pub async fn set_container_size(&mut self, id: CellId, size: Size) -> WriteOutcome {
        if !self.cells.contains_key(&id) || !self.resize_frame(id, size) {
            return WriteOutcome::Saved;
        }
        self.persist_reclamped(&[id]).await
    }

    /// Returns true when the new size moved the image offset.
    fn resize_frame(&mut self, id: CellId, size: Size) -> bool {
        let offset = {
            let frame = self.frame_mut(id);
            frame.set_container(size);
            frame.offset()
        };
        let moved = self
            .cells
            .get(&id)
            .is_some_and(|c| c.image.offset_x != offset.x || c.image.offset_y != offset.y);
        self.set_local_offset(id, offset);
        moved
    }

    async fn persist_reclamped(&mut self, ids: &[CellId]) -> WriteOutcome {
        if ids.is_empty() {
            return WriteOutcome::Saved;
        }
        log::debug!("Re-clamped image offsets after resize: {:?}", ids);
        self.emit(GridEvent::CellsChanged(ids.to_vec()));
        self.persist(ids).await
    }

    /// Record the natural size read when the image finished loading.
    pub fn image_loaded(&mut self, id: CellId, natural: Size) {
        if !self.cells.contains_key(&id) {
            return;
        }
        let offset = {
            let frame = self.frame_mut(id);
            frame.image_loaded(natural);
            frame.offset()
        };
        self.set_local_offset(id, offset);
    }

    fn set_local_offset(&mut self, id: CellId, offset: Offset) {
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.image.offset_x = offset.x;
            cell.image.offset_y = offset.y;
        }
    }

    fn image_cell(&self, id: CellId) -> Result<(), EditError> {
        if !self.visible_cell(id)?.has_image() {
            return Err(EditError::NoImage(id));
        }
        Ok(())
    }

    /// Pointer-down over an image. `Ok(false)` while the natural size is
    /// still unknown.
    pub fn begin_image_drag(&mut self, id: CellId, pointer: Offset) -> Result<bool, EditError> {
        self.image_cell(id)?;
        if self.is_uploading(id) {
            return Err(EditError::UploadInFlight(id));
        }
        Ok(self.frame_mut(id).begin_drag(pointer))
    }

    /// Pointer-move: local preview only.
    pub fn drag_image(&mut self, id: CellId, pointer: Offset) -> Option<Offset> {
        let offset = self.frames.get_mut(&id)?.drag_to(pointer)?;
        self.set_local_offset(id, offset);
        log::trace!("Drag preview cell {}: ({:.1}, {:.1})", id, offset.x, offset.y);
        self.emit(GridEvent::ImagePreview { cell: id, offset });
        Some(offset)
    }

    /// Pointer-up: clamp and commit. `Ok(None)` when no drag was active.
    pub async fn end_image_drag(
        &mut self,
        id: CellId,
        pointer: Offset,
    ) -> Result<Option<WriteOutcome>, EditError> {
        let Some(commit) = self.frames.get_mut(&id).and_then(|f| f.end_drag(pointer)) else {
            return Ok(None);
        };
        self.commit_transform(id, commit).await.map(Some)
    }

    pub fn cancel_image_drag(&mut self, id: CellId) {
        if let Some(frame) = self.frames.get_mut(&id) {
            frame.cancel_drag();
        }
    }

    /// Slider change: clamp scale, re-clamp offset, commit both in one write.
    pub async fn set_image_scale(
        &mut self,
        id: CellId,
        scale: f32,
    ) -> Result<Option<WriteOutcome>, EditError> {
        self.image_cell(id)?;
        let Some(commit) = self.frame_mut(id).set_scale(scale) else {
            return Ok(None);
        };
        self.commit_transform(id, commit).await.map(Some)
    }

    /// Scale the image to the smallest cover-fit.
    pub async fn fit_image(&mut self, id: CellId) -> Result<Option<WriteOutcome>, EditError> {
        self.image_cell(id)?;
        let Some(commit) = self.frame_mut(id).fit() else {
            return Ok(None);
        };
        self.commit_transform(id, commit).await.map(Some)
    }

    async fn commit_transform(
        &mut self,
        id: CellId,
        commit: TransformCommit,
    ) -> Result<WriteOutcome, EditError> {
        log::debug!(
            "Commit image transform cell {}: offset ({:.1}, {:.1}) scale {:.2}",
            id, commit.offset.x, commit.offset.y, commit.scale
        );
        self.update_cell(id, |c| {
            c.image.offset_x = commit.offset.x;
            c.image.offset_y = commit.offset.y;
            c.image.scale = commit.scale;
        })
        .await
    }

    // ─── Upload & paste ─────────────────────────────────────────────

    /// Mark `id` as uploading; dragging is refused until the ticket is
    /// finished.
    pub fn start_upload(&mut self, id: CellId) -> Result<UploadTicket, EditError> {
        self.visible_cell(id)?;
        let token = Uuid::new_v4();
        self.uploads.insert(id, token);
        self.frame_mut(id).set_uploading(true);
        Ok(UploadTicket { cell: id, token })
    }

    /// Clear the uploading flag and, on success, show the uploaded image.
    pub async fn finish_upload(
        &mut self,
        ticket: UploadTicket,
        result: Result<String, StoreError>,
    ) -> Result<WriteOutcome, EditError> {
        let id = ticket.cell;
        if self.uploads.get(&id) != Some(&ticket.token) {
            log::debug!("Dropping superseded upload result for cell {}", id);
            return Err(EditError::StaleUpload(id));
        }
        self.uploads.remove(&id);
        if let Some(frame) = self.frames.get_mut(&id) {
            frame.set_uploading(false);
        }
        let url = result.inspect_err(|e| log::error!("Image upload for cell {} failed: {}", id, e))?;
        self.show_image(id, url).await
    }

    /// Upload `bytes` and show them in `id`.
    pub async fn upload_image(
        &mut self,
        id: CellId,
        bytes: Vec<u8>,
        extension: &str,
    ) -> Result<WriteOutcome, EditError> {
        let ticket = self.start_upload(id)?;
        let path = format!("{}/{}/{}-{}.{}", self.project, self.section, id, Uuid::new_v4(), extension);
        log::debug!("Uploading {} bytes to {}", bytes.len(), path);
        let result = self.images.upload_image(&path, bytes).await;
        self.finish_upload(ticket, result).await
    }

    async fn show_image(&mut self, id: CellId, url: String) -> Result<WriteOutcome, EditError> {
        // New image, new natural size.
        self.frames.remove(&id);
        self.update_cell(id, |c| c.set_image(url)).await
    }

    /// Paste into the single selected cell. `Ok(None)` when the paste does
    /// not apply: a text control has focus, the selection is not exactly
    /// one cell, or the payload is not an image.
    pub async fn paste(
        &mut self,
        payload: ClipboardPayload,
        text_input_focused: bool,
    ) -> Result<Option<WriteOutcome>, EditError> {
        if text_input_focused {
            return Ok(None);
        }
        let Some(id) = self.selection.single() else {
            return Ok(None);
        };
        match payload {
            ClipboardPayload::Image { bytes, mime } => match extension_for_mime(&mime) {
                Some(ext) => self.upload_image(id, bytes, ext).await.map(Some),
                None => {
                    log::debug!("Ignoring pasted file of type {}", mime);
                    Ok(None)
                }
            },
            ClipboardPayload::Text(text) => match image_url(&text) {
                Some(url) => self.show_image(id, url.to_string()).await.map(Some),
                None => Ok(None),
            },
        }
    }
}
