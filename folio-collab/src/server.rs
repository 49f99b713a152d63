//! WebSocket pub/sub relay.
//!
//! Architecture:
//! ```text
//! Client A ──┐  Subscribe / Publish         ┌── forward task (topic x) ──► Client A
//!             ├──────────────► TopicBus ─────┤
//! Client B ──┘                 (per topic    └── forward task (topic x) ──► Client B
//!                               broadcast)
//! ```
//!
//! Each connection owns one forwarding task per subscribed topic. A task
//! drains the topic's broadcast receiver into the connection's outgoing
//! queue; it is aborted on `Unsubscribe` or when the connection closes.
//! Publications reach every subscriber, the publishing connection included.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::broadcast::TopicBus;
use crate::protocol::{FrameKind, ProtocolError, RelayFrame};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per topic
    pub broadcast_capacity: usize,
    /// Subscriptions a single connection may hold
    pub max_topics_per_connection: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            max_topics_per_connection: 64,
        }
    }
}

impl ServerConfig {
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            broadcast_capacity: 32,
            max_topics_per_connection: 4,
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
    pub publications: u64,
    pub rejected_subscriptions: u64,
    pub active_topics: usize,
}

type WsStream = WebSocketStream<TcpStream>;

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    bus: Arc<TopicBus>,
    stats: Arc<RwLock<RelayStats>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            bus: Arc::new(TopicBus::new(config.broadcast_capacity)),
            stats: Arc::new(RwLock::new(RelayStats::default())),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Topic bus shared by all connections.
    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }

    /// Bind the configured address and serve until an accept error.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let bus = self.bus.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, bus, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        bus: Arc<TopicBus>,
        stats: Arc<RwLock<RelayStats>>,
        config: ServerConfig,
    ) -> Result<(), RelayError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut forwards: HashMap<String, JoinHandle<()>> = HashMap::new();
        let result = Self::pump(ws_stream, addr, &bus, &stats, &config, &mut forwards).await;

        for (_, forward) in forwards.drain() {
            stop_forward(forward).await;
        }
        let pruned = bus.prune_idle();

        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_topics = bus.topic_count();
        }
        log::info!("Connection closed from {addr} ({pruned} idle topics pruned)");
        result
    }

    /// Route frames in both directions until the peer goes away.
    async fn pump(
        ws_stream: WsStream,
        addr: SocketAddr,
        bus: &Arc<TopicBus>,
        stats: &Arc<RwLock<RelayStats>>,
        config: &ServerConfig,
        forwards: &mut HashMap<String, JoinHandle<()>>,
    ) -> Result<(), RelayError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            let frame = match RelayFrame::decode(&bytes) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    log::warn!("Failed to decode frame from {addr}: {e}");
                                    continue;
                                }
                            };
                            {
                                let mut s = stats.write().await;
                                s.total_frames += 1;
                                s.total_bytes += bytes.len() as u64;
                            }

                            match frame.kind {
                                FrameKind::Subscribe => {
                                    if forwards.contains_key(&frame.topic) {
                                        continue;
                                    }
                                    if forwards.len() >= config.max_topics_per_connection {
                                        log::warn!(
                                            "{addr} exceeded {} topics, ignoring subscribe to {}",
                                            config.max_topics_per_connection,
                                            frame.topic
                                        );
                                        stats.write().await.rejected_subscriptions += 1;
                                        continue;
                                    }
                                    let forward = Self::spawn_forward(bus, &frame.topic, out_tx.clone());
                                    forwards.insert(frame.topic.clone(), forward);
                                    stats.write().await.active_topics = bus.topic_count();
                                    log::debug!("{addr} subscribed to {}", frame.topic);
                                }

                                FrameKind::Unsubscribe => {
                                    if let Some(forward) = forwards.remove(&frame.topic) {
                                        stop_forward(forward).await;
                                        bus.remove_if_idle(&frame.topic);
                                        stats.write().await.active_topics = bus.topic_count();
                                        log::debug!("{addr} unsubscribed from {}", frame.topic);
                                    }
                                }

                                FrameKind::Publish => {
                                    let receivers = bus.publish_raw(&frame.topic, Arc::new(frame.payload));
                                    stats.write().await.publications += 1;
                                    log::trace!("{addr} published on {} to {receivers} receivers", frame.topic);
                                }

                                FrameKind::Ping => {
                                    let pong = RelayFrame::pong().encode()?;
                                    ws_sender.send(Message::Binary(pong.into())).await?;
                                }

                                FrameKind::Message | FrameKind::Pong => {
                                    log::debug!("Unexpected {:?} frame from {addr}", frame.kind);
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            return Ok(());
                        }

                        _ => {}
                    }
                }

                outgoing = out_rx.recv() => {
                    // `out_tx` lives as long as this loop, so the queue never closes here.
                    if let Some(bytes) = outgoing {
                        ws_sender.send(Message::Binary(bytes.into())).await?;
                    }
                }
            }
        }
    }

    /// Drain one topic into a connection's outgoing queue as `Message` frames.
    fn spawn_forward(
        bus: &TopicBus,
        topic: &str,
        out_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> JoinHandle<()> {
        let mut rx = bus.channel(topic).receiver();
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => {
                        let frame = RelayFrame::message(topic.clone(), payload.to_vec());
                        match frame.encode() {
                            Ok(bytes) => {
                                if out_tx.send(bytes).is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::error!("Failed to encode message on {topic}: {e}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Forward on {topic} lagged by {n} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Abort a forward task and wait until it has dropped its topic receiver.
async fn stop_forward(forward: JoinHandle<()>) {
    forward.abort();
    if let Err(e) = forward.await {
        if !e.is_cancelled() {
            log::error!("Forward task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.broadcast_capacity, 256);
        assert_eq!(config.max_topics_per_connection, 64);
    }

    #[test]
    fn test_server_creation() {
        let server = RelayServer::new(ServerConfig::for_testing());
        assert_eq!(server.bind_addr(), "127.0.0.1:0");
        assert_eq!(server.bus().capacity(), 32);
        assert_eq!(server.bus().topic_count(), 0);
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = RelayServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.publications, 0);
        assert_eq!(stats.active_topics, 0);
    }

    #[tokio::test]
    async fn test_forward_wraps_publications() {
        let bus = TopicBus::new(8);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let forward = RelayServer::spawn_forward(&bus, "canvas:p", out_tx);

        assert_eq!(bus.publish_raw("canvas:p", Arc::new(vec![9, 9])), 1);
        let bytes = out_rx.recv().await.unwrap();
        let frame = RelayFrame::decode(&bytes).unwrap();
        assert_eq!(frame, RelayFrame::message("canvas:p", vec![9, 9]));

        stop_forward(forward).await;
        assert_eq!(bus.subscriber_count("canvas:p"), 0);
        assert!(bus.remove_if_idle("canvas:p"));
    }
}
