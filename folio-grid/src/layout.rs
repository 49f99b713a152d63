//! Section layout backed by Taffy's CSS grid.
//!
//! Each visible cell becomes a grid item placed at its origin line and
//! spanning `row_span × col_span` tracks. The resulting rectangles drive hit
//! testing and tell the transform subsystem how large each image container
//! is.
//!
//! # Design decisions
//!
//! * **Fresh tree per compute.**  A section has at most a few dozen cells,
//!   so the tree is rebuilt instead of diffed.
//! * **Hidden cells never reach Taffy.**  They would otherwise be
//!   auto-placed into free tracks.

use folio_core::{CellId, GridItem, NUM_COLS};
use rustc_hash::FxHashMap;
use taffy::geometry::Line;
use taffy::prelude::*;
use taffy::style::GridPlacement;
use taffy::TaffyError;
use thiserror::Error;

use crate::transform::Size as FrameSize;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Taffy error: {0}")]
    Taffy(#[from] TaffyError),
    #[error("Invalid layout config: {0}")]
    InvalidConfig(String),
    #[error("Cell {cell} at row {row} is outside the placeable grid")]
    RowOutOfRange { cell: CellId, row: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Total section width in pixels.
    pub width: f32,
    pub row_height: f32,
    pub gap: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            row_height: 220.0,
            gap: 16.0,
        }
    }
}

impl LayoutConfig {
    /// Round numbers for assertions: 4 × 100px columns, 100px rows, 10px gap.
    pub fn for_testing() -> Self {
        Self {
            width: 430.0,
            row_height: 100.0,
            gap: 10.0,
        }
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let finite = self.width.is_finite() && self.row_height.is_finite() && self.gap.is_finite();
        if !finite || self.width <= 0.0 || self.row_height <= 0.0 || self.gap < 0.0 {
            return Err(LayoutError::InvalidConfig(format!("{self:?}")));
        }
        Ok(())
    }

    fn column_width(&self) -> f32 {
        ((self.width - self.gap * (NUM_COLS - 1) as f32) / NUM_COLS as f32).max(0.0)
    }
}

/// Pixel rectangle of one laid-out cell, relative to the section origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CellRect {
    #[inline]
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionLayout {
    rects: FxHashMap<CellId, CellRect>,
    width: f32,
    height: f32,
}

impl SectionLayout {
    pub fn compute<'a>(
        cells: impl IntoIterator<Item = &'a GridItem>,
        rows: u32,
        config: &LayoutConfig,
    ) -> Result<Self, LayoutError> {
        config.validate()?;

        let mut taffy: TaffyTree<()> = TaffyTree::new();
        let mut placed: Vec<(CellId, NodeId)> = Vec::new();

        for cell in cells.into_iter().filter(|c| c.is_visible() && c.row <= rows) {
            let row_span = cell.row_span.clamp(1, rows - cell.row + 1);
            let col_span = cell.col_span.clamp(1, NUM_COLS + 1 - cell.col.min(NUM_COLS));
            let out_of_range = || LayoutError::RowOutOfRange {
                cell: cell.id,
                row: cell.row,
            };
            let row_line = i16::try_from(cell.row).map_err(|_| out_of_range())?;
            let row_span = u16::try_from(row_span).map_err(|_| out_of_range())?;
            // Columns never exceed NUM_COLS.
            let col_line = cell.col.min(NUM_COLS) as i16;
            let style = Style {
                grid_row: Line {
                    start: GridPlacement::Line(row_line.into()),
                    end: GridPlacement::Span(row_span),
                },
                grid_column: Line {
                    start: GridPlacement::Line(col_line.into()),
                    end: GridPlacement::Span(col_span as u16),
                },
                ..Style::default()
            };
            placed.push((cell.id, taffy.new_leaf(style)?));
        }

        let children: Vec<NodeId> = placed.iter().map(|(_, node)| *node).collect();
        let root = taffy.new_with_children(
            Style {
                display: Display::Grid,
                size: Size {
                    width: Dimension::length(config.width),
                    height: Dimension::auto(),
                },
                gap: Size {
                    width: LengthPercentage::length(config.gap),
                    height: LengthPercentage::length(config.gap),
                },
                grid_template_columns: vec![length(config.column_width()); NUM_COLS as usize],
                grid_template_rows: vec![length(config.row_height); rows as usize],
                ..Style::default()
            },
            &children,
        )?;
        taffy.compute_layout(root, Size::MAX_CONTENT)?;

        let mut rects = FxHashMap::default();
        rects.reserve(placed.len());
        for (id, node) in placed {
            let layout = taffy.layout(node)?;
            rects.insert(
                id,
                CellRect {
                    x: layout.location.x,
                    y: layout.location.y,
                    width: layout.size.width,
                    height: layout.size.height,
                },
            );
        }
        let root_layout = taffy.layout(root)?;

        log::debug!(
            "Section layout: {} cells over {} rows ({}×{}px)",
            rects.len(),
            rows,
            root_layout.size.width,
            root_layout.size.height
        );

        Ok(Self {
            rects,
            width: root_layout.size.width,
            height: root_layout.size.height,
        })
    }

    pub fn rect(&self, id: CellId) -> Option<&CellRect> {
        self.rects.get(&id)
    }

    pub fn rects(&self) -> impl Iterator<Item = (CellId, &CellRect)> {
        self.rects.iter().map(|(id, rect)| (*id, rect))
    }

    /// Visible cell under `(x, y)`. Points in the gaps hit nothing.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<CellId> {
        self.rects
            .iter()
            .find(|(_, rect)| rect.contains(x, y))
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }
}
