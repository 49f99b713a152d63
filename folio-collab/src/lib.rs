//! # folio-collab: whiteboard sync, relay and persistence
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   CanvasEnvelope   ┌─────────────┐
//! │ CanvasSync  │ ◄────────────────► │ RelayServer │
//! │ (per tab)   │  RelayFrame / WS   │ (central)   │
//! └──────┬──────┘                    └──────┬──────┘
//!        │ SnapshotStore                    │
//!        ▼                                  ▼
//! ┌─────────────┐                    ┌─────────────┐
//! │ProjectStore │                    │  TopicBus   │
//! │ (RocksDB)   │                    │  (fan-out)  │
//! └─────────────┘                    └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: bincode wire formats (`CanvasEnvelope`, `RelayFrame`)
//! - [`broadcast`]: per-topic fan-out, the in-process `PubSub`
//! - [`throttle`]: trailing-edge save throttle
//! - [`canvas`]: mount/unmount sync session for one project
//! - [`server`]: WebSocket relay
//! - [`client`]: relay client implementing `PubSub`
//! - [`storage`]: RocksDB store for cells, snapshots and images

pub mod broadcast;
pub mod canvas;
pub mod client;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod throttle;

pub use broadcast::{BroadcastStats, TopicBus, TopicChannel};
pub use canvas::{CanvasConfig, CanvasSync, MountedCanvas, Reception, SyncError, SyncStats};
pub use client::{ConnectionState, RelayClient};
pub use protocol::{canvas_topic, CanvasEnvelope, FrameKind, ProtocolError, RelayFrame};
pub use server::{RelayError, RelayServer, RelayStats, ServerConfig};
pub use storage::{ProjectMetadata, ProjectStore, StoreConfig};
pub use throttle::TrailingThrottle;
