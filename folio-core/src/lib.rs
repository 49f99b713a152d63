//! # folio-core: shared model for Folio sections and whiteboards
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐
//! │  ids         │   │  cell        │   │  store                   │
//! │  ProjectId   │──▶│  GridItem    │──▶│  CellStore / Snapshot-   │
//! │  SectionId   │   │  TextField   │   │  Store / ImageStore /    │
//! │  SessionId   │   │  cell_id()   │   │  PubSub / Subscription   │
//! └──────────────┘   └──────────────┘   └────────────┬─────────────┘
//!                                                    │
//!                    ┌──────────────┐   ┌────────────▼─────────────┐
//!                    │  snapshot    │   │  memory                  │
//!                    │  Canvas-     │   │  MemoryStore (tests,     │
//!                    │  Snapshot    │   │  embedded use)           │
//!                    └──────────────┘   └──────────────────────────┘
//! ```
//!
//! Everything here is synchronous and allocation-light except the adapter
//! traits, which are `async` so that editors and sync sessions can sit on top
//! of a network or disk backend without blocking the runtime.

pub mod cell;
pub mod ids;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use cell::{
    cell_id, cell_position, checked_cell_id, GridItem, HorizontalAlign, ImagePayload,
    TemplateType, TextBlock, TextField, TextPayload, TextStyle, VerticalAlign,
    DEFAULT_FONT_FAMILY, MAX_ROWS, MAX_SCALE, MERGE_MARKER, MIN_ROWS, MIN_SCALE, NUM_COLS,
};
pub use ids::{CellId, ProjectId, SectionId, SessionId};
pub use memory::MemoryStore;
pub use snapshot::CanvasSnapshot;
pub use store::{CellStore, ImageStore, PubSub, SnapshotStore, StoreError, Subscription};
