//! Persistent storage for projects.
//!
//! Architecture:
//! ```text
//! ┌─────────────┐   cells    ┌──────────────┐
//! │ GridEditor  │ ─────────► │              │
//! └─────────────┘            │ ProjectStore │
//! ┌─────────────┐ snapshots  │ (RocksDB)    │
//! │ CanvasSync  │ ─────────► │              │
//! └─────────────┘            └──────┬───────┘
//!                                   │ column families
//!                                   ▼
//!                ┌──────────────────────────────────────┐
//!                │ CF "cells"    : bincode grid rows    │
//!                │ CF "snapshots": LZ4 whiteboard JSON  │
//!                │ CF "images"   : uploaded bytes       │
//!                │ CF "metadata" : per-project counters │
//!                └──────────────────────────────────────┘
//! ```

pub mod rocks;

pub use rocks::{ProjectMetadata, ProjectStore, StoreConfig};
