//! Wire formats for canvas sync and the relay.
//!
//! Canvas broadcast (bincode, published on `canvas:{project_id}`):
//! ```text
//! ┌──────────────────────────┬───────────────────────┐
//! │ snapshot                 │ origin_session_id     │
//! │ JSON bytes, length-      │ 16 bytes              │
//! │ prefixed                 │                       │
//! └──────────────────────────┴───────────────────────┘
//! ```
//! A client drops any envelope whose `origin_session_id` equals its own.
//!
//! Relay frame (bincode, one per WebSocket binary message):
//! ```text
//! ┌──────────┬──────────────┬──────────┐
//! │ kind     │ topic        │ payload  │
//! │ 1 byte   │ variable     │ variable │
//! └──────────┴──────────────┴──────────┘
//! ```

use folio_core::{CanvasSnapshot, ProjectId, SessionId, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CANVAS_TOPIC_PREFIX: &str = "canvas:";

/// Broadcast topic carrying one project's whiteboard.
pub fn canvas_topic(project: ProjectId) -> String {
    format!("{CANVAS_TOPIC_PREFIX}{project}")
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<ProtocolError> for StoreError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::SerializationError(msg) => StoreError::Serialization(msg),
            ProtocolError::DeserializationError(msg) => StoreError::Deserialization(msg),
            ProtocolError::ConnectionClosed => StoreError::Transport(e.to_string()),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

// ───────────────────────────────────────────────────────────────────
// CanvasEnvelope
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasEnvelope {
    /// Snapshot as JSON bytes.
    pub snapshot: Vec<u8>,
    pub origin_session_id: SessionId,
}

impl CanvasEnvelope {
    pub fn new(snapshot: &CanvasSnapshot, origin: SessionId) -> Result<Self, ProtocolError> {
        Ok(Self {
            snapshot: snapshot
                .to_bytes()
                .map_err(|e| ProtocolError::SerializationError(e.to_string()))?,
            origin_session_id: origin,
        })
    }

    pub fn snapshot(&self) -> Result<CanvasSnapshot, ProtocolError> {
        CanvasSnapshot::from_bytes(&self.snapshot)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    pub fn is_from(&self, session: SessionId) -> bool {
        self.origin_session_id == session
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

// ───────────────────────────────────────────────────────────────────
// RelayFrame
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    /// Client → relay: start forwarding `topic`
    Subscribe = 1,
    /// Client → relay: stop forwarding `topic`
    Unsubscribe = 2,
    /// Client → relay: fan `payload` out on `topic`
    Publish = 3,
    /// Relay → client: a publication on a subscribed topic
    Message = 4,
    Ping = 5,
    Pong = 6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFrame {
    pub kind: FrameKind,
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RelayFrame {
    fn bare(kind: FrameKind, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: topic.into(),
            payload: Vec::new(),
        }
    }

    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::bare(FrameKind::Subscribe, topic)
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self::bare(FrameKind::Unsubscribe, topic)
    }

    pub fn publish(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Publish,
            topic: topic.into(),
            payload,
        }
    }

    pub fn message(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Message,
            topic: topic.into(),
            payload,
        }
    }

    pub fn ping() -> Self {
        Self::bare(FrameKind::Ping, "")
    }

    pub fn pong() -> Self {
        Self::bare(FrameKind::Pong, "")
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}
