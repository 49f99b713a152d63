use folio_core::{CellId, StoreError};
use thiserror::Error;

use crate::layout::LayoutError;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Merge needs at least two selected cells, got {0}")]
    TooFewCells(usize),
    #[error("Selected cells do not form a rectangle")]
    NotRectangular,
    #[error("Cell not found: {0}")]
    CellNotFound(CellId),
    #[error("Cell is hidden: {0}")]
    CellHidden(CellId),
    #[error("Cell is not merged: {0}")]
    NotMerged(CellId),
    #[error("Cannot go below {min} rows")]
    MinRows { min: u32 },
    #[error("Cannot go above {max} rows")]
    MaxRows { max: u32 },
    #[error("Cell has no image: {0}")]
    NoImage(CellId),
    #[error("Upload in flight for cell {0}")]
    UploadInFlight(CellId),
    #[error("Upload for cell {0} was superseded by a newer one")]
    StaleUpload(CellId),
    #[error("Persistence failed: {0}")]
    Persist(#[from] StoreError),
    #[error("Layout failed: {0}")]
    Layout(#[from] LayoutError),
}
