//! Merge/unmerge planning.
//!
//! Planning is pure: it looks at cells and returns which ids change and how.
//! The editor persists a plan first and applies it locally afterwards.

use folio_core::{CellId, GridItem};
use std::collections::HashSet;

use crate::error::EditError;

/// Inclusive row/column rectangle of grid positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min_row: u32,
    pub max_row: u32,
    pub min_col: u32,
    pub max_col: u32,
}

impl CellRange {
    pub fn of(cell: &GridItem) -> Self {
        Self {
            min_row: cell.row,
            max_row: cell.row_end(),
            min_col: cell.col,
            max_col: cell.col_end(),
        }
    }

    pub fn union(self, other: CellRange) -> Self {
        Self {
            min_row: self.min_row.min(other.min_row),
            max_row: self.max_row.max(other.max_row),
            min_col: self.min_col.min(other.min_col),
            max_col: self.max_col.max(other.max_col),
        }
    }

    pub fn row_span(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    pub fn col_span(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    pub fn area(&self) -> usize {
        (self.row_span() * self.col_span()) as usize
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.min_row..=self.max_row).contains(&row) && (self.min_col..=self.max_col).contains(&col)
    }

    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> {
        let cols = self.min_col..=self.max_col;
        (self.min_row..=self.max_row).flat_map(move |row| cols.clone().map(move |col| (row, col)))
    }
}

/// Bounding rectangle over every cell's footprint.
pub fn bounding_range<'a>(cells: impl IntoIterator<Item = &'a GridItem>) -> Option<CellRange> {
    cells.into_iter().map(CellRange::of).reduce(CellRange::union)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub anchor: CellId,
    pub row_span: u32,
    pub col_span: u32,
    /// Selected cells other than the anchor; they become hidden.
    pub absorbed: Vec<CellId>,
}

/// Plan merging `selected` into one rectangle.
///
/// The selected footprints must tile their bounding rectangle exactly: every
/// position covered once and nothing outside. The anchor is the cell whose
/// origin is the rectangle's top-left corner.
pub fn plan_merge(selected: &[&GridItem]) -> Result<MergePlan, EditError> {
    if selected.len() < 2 {
        return Err(EditError::TooFewCells(selected.len()));
    }
    if let Some(hidden) = selected.iter().find(|c| c.hidden) {
        return Err(EditError::CellHidden(hidden.id));
    }

    let range = bounding_range(selected.iter().copied()).ok_or(EditError::TooFewCells(0))?;

    let mut covered = HashSet::with_capacity(range.area());
    for cell in selected {
        for position in CellRange::of(cell).positions() {
            if !covered.insert(position) {
                return Err(EditError::NotRectangular);
            }
        }
    }
    if covered.len() != range.area() {
        return Err(EditError::NotRectangular);
    }

    let anchor = selected
        .iter()
        .find(|c| c.row == range.min_row && c.col == range.min_col)
        .ok_or(EditError::NotRectangular)?;

    Ok(MergePlan {
        anchor: anchor.id,
        row_span: range.row_span(),
        col_span: range.col_span(),
        absorbed: selected
            .iter()
            .filter(|c| c.id != anchor.id)
            .map(|c| c.id)
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmergePlan {
    pub anchor: CellId,
    /// Cells inside the former rectangle that become visible again.
    pub released: Vec<CellId>,
}

pub fn plan_unmerge<'a>(
    anchor: &GridItem,
    cells: impl IntoIterator<Item = &'a GridItem>,
) -> Result<UnmergePlan, EditError> {
    if anchor.hidden {
        return Err(EditError::CellHidden(anchor.id));
    }
    if !anchor.is_merged() {
        return Err(EditError::NotMerged(anchor.id));
    }
    let range = CellRange::of(anchor);
    let mut released: Vec<CellId> = cells
        .into_iter()
        .filter(|c| c.id != anchor.id && range.contains(c.row, c.col))
        .map(|c| c.id)
        .collect();
    released.sort_unstable();
    Ok(UnmergePlan {
        anchor: anchor.id,
        released,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: u32) -> Vec<GridItem> {
        GridItem::default_band(rows)
    }

    fn pick<'a>(cells: &'a [GridItem], ids: &[CellId]) -> Vec<&'a GridItem> {
        ids.iter()
            .map(|id| cells.iter().find(|c| c.id == *id).unwrap())
            .collect()
    }

    #[test]
    fn test_square_merge() {
        let cells = grid(2);
        let plan = plan_merge(&pick(&cells, &[6, 1, 2, 5])).unwrap();
        assert_eq!(plan.anchor, 1);
        assert_eq!((plan.row_span, plan.col_span), (2, 2));
        let mut absorbed = plan.absorbed.clone();
        absorbed.sort();
        assert_eq!(absorbed, vec![2, 5, 6]);
    }

    #[test]
    fn test_horizontal_strip() {
        let cells = grid(2);
        let plan = plan_merge(&pick(&cells, &[2, 3, 4])).unwrap();
        assert_eq!(plan.anchor, 2);
        assert_eq!((plan.row_span, plan.col_span), (1, 3));
    }

    #[test]
    fn test_l_shape_rejected() {
        let cells = grid(2);
        let err = plan_merge(&pick(&cells, &[1, 2, 5])).unwrap_err();
        assert!(matches!(err, EditError::NotRectangular));
    }

    #[test]
    fn test_gap_rejected() {
        let cells = grid(1);
        assert!(matches!(
            plan_merge(&pick(&cells, &[1, 3])).unwrap_err(),
            EditError::NotRectangular
        ));
    }

    #[test]
    fn test_too_few() {
        let cells = grid(1);
        assert!(matches!(
            plan_merge(&pick(&cells, &[1])).unwrap_err(),
            EditError::TooFewCells(1)
        ));
    }

    #[test]
    fn test_merge_with_existing_anchor() {
        // 1 already spans 1..2 × 1..2; adding column 3 of both rows forms 2×3.
        let mut cells = grid(2);
        cells[0].row_span = 2;
        cells[0].col_span = 2;
        let plan = plan_merge(&pick(&cells, &[1, 3, 7])).unwrap();
        assert_eq!(plan.anchor, 1);
        assert_eq!((plan.row_span, plan.col_span), (2, 3));
    }

    #[test]
    fn test_overlapping_footprints_rejected() {
        let mut cells = grid(2);
        cells[0].col_span = 2;
        assert!(matches!(
            plan_merge(&pick(&cells, &[1, 2])).unwrap_err(),
            EditError::NotRectangular
        ));
    }

    #[test]
    fn test_unmerge_plan() {
        let mut cells = grid(3);
        cells[1].row_span = 2;
        cells[1].col_span = 2;
        let anchor = cells[1].clone();
        let plan = plan_unmerge(&anchor, &cells).unwrap();
        assert_eq!(plan.anchor, 2);
        assert_eq!(plan.released, vec![3, 6, 7]);
    }

    #[test]
    fn test_unmerge_requires_merged() {
        let cells = grid(2);
        assert!(matches!(
            plan_unmerge(&cells[0], &cells).unwrap_err(),
            EditError::NotMerged(1)
        ));
    }

    #[test]
    fn test_range_positions() {
        let range = CellRange { min_row: 1, max_row: 2, min_col: 3, max_col: 4 };
        assert_eq!(range.positions().collect::<Vec<_>>(), vec![(1, 3), (1, 4), (2, 3), (2, 4)]);
        assert_eq!(range.area(), 4);
    }
}
