//! # folio-grid: section grid editing
//!
//! ```text
//!   clicks / pointer / clipboard
//!              │
//!   ┌──────────▼───────────┐      ┌─────────────────┐
//!   │  GridEditor          │─────▶│  CellStore      │  (folio-core traits)
//!   │  ├─ Selection        │      │  ImageStore     │
//!   │  ├─ merge planning   │      └─────────────────┘
//!   │  └─ ImageFrame ×N    │
//!   └──────────┬───────────┘
//!              │ GridEvent (broadcast)
//!              ▼
//!        renderer / UI           SectionLayout (taffy) ──▶ container sizes
//! ```

pub mod clipboard;
pub mod editor;
pub mod error;
pub mod layout;
pub mod merge;
pub mod selection;
pub mod transform;

pub use clipboard::ClipboardPayload;
pub use editor::{BatchReport, EditorConfig, GridEditor, GridEvent, UploadTicket, WriteOutcome};
pub use error::EditError;
pub use layout::{CellRect, LayoutConfig, LayoutError, SectionLayout};
pub use selection::{Selection, SelectionState};
pub use transform::{ImageFrame, Offset, Size, TransformCommit, TransformLimits};
