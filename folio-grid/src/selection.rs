//! Selection state machine.
//!
//! ```text
//!                 click(a)                  modifier click(b)
//!  NoSelection ─────────────▶ Single(a) ───────────────────────▶ Multi{a,b}
//!       ▲                        │  ▲                                │
//!       │  modifier click(a)     │  │  modifier click(b)            │
//!       └────────────────────────┘  └────────────────────────────────┘
//! ```
//!
//! Visibility is the caller's concern: the editor never forwards clicks on
//! hidden or unknown cells.

use folio_core::CellId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    NoSelection,
    Single(CellId),
    Multi(Vec<CellId>),
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    cells: BTreeSet<CellId>,
    multi_mode: bool,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain click replaces the selection; a modifier click (or any click in
    /// multi-select mode) toggles membership.
    pub fn click(&mut self, id: CellId, modifier: bool) {
        if modifier || self.multi_mode {
            if !self.cells.remove(&id) {
                self.cells.insert(id);
            }
        } else {
            self.select_only(id);
        }
    }

    /// Right-click: an unselected cell becomes the whole selection, a
    /// selected one keeps the current selection.
    pub fn context(&mut self, id: CellId) {
        if !self.cells.contains(&id) {
            self.select_only(id);
        }
    }

    fn select_only(&mut self, id: CellId) {
        self.cells.clear();
        self.cells.insert(id);
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    pub fn set_multi_mode(&mut self, on: bool) {
        self.multi_mode = on;
    }

    pub fn multi_mode(&self) -> bool {
        self.multi_mode
    }

    /// Drop ids that no longer qualify, e.g. after a row was removed.
    pub fn retain(&mut self, mut keep: impl FnMut(CellId) -> bool) {
        self.cells.retain(|id| keep(*id));
    }

    pub fn state(&self) -> SelectionState {
        match self.cells.len() {
            0 => SelectionState::NoSelection,
            1 => self
                .single()
                .map_or(SelectionState::NoSelection, SelectionState::Single),
            _ => SelectionState::Multi(self.cells.iter().copied().collect()),
        }
    }

    /// The selected id when exactly one cell is selected.
    pub fn single(&self) -> Option<CellId> {
        if self.cells.len() == 1 {
            self.cells.first().copied()
        } else {
            None
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.iter().copied()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
