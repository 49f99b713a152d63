//! WebSocket relay client.
//!
//! Mirrors remote topics into a local [`TopicBus`], so a `RelayClient` can be
//! handed to anything that takes a `PubSub`:
//!
//! ```text
//! CanvasSync ──publish──► outgoing queue ──► writer task ──► relay
//! CanvasSync ◄─Subscription── TopicBus ◄── reader task ◄──── relay
//! ```
//!
//! The relay learns about a topic on its first local subscriber and forgets
//! it when the last one drops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use folio_core::{PubSub, StoreError, Subscription};

use crate::broadcast::TopicBus;
use crate::protocol::{FrameKind, ProtocolError, RelayFrame};
use crate::server::RelayError;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

type RefCounts = Arc<Mutex<HashMap<String, usize>>>;

pub struct RelayClient {
    url: String,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    mirror: Arc<TopicBus>,
    refs: RefCounts,
    connected: Arc<AtomicBool>,
    pongs: Arc<AtomicU64>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl RelayClient {
    /// Connect to a relay at `url` (e.g. `ws://127.0.0.1:9090`).
    ///
    /// `capacity` bounds each mirrored topic's local broadcast channel.
    pub async fn connect(url: impl Into<String>, capacity: usize) -> Result<Self, RelayError> {
        let url = url.into();
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let connected = Arc::new(AtomicBool::new(true));
        let mirror = Arc::new(TopicBus::new(capacity));
        let pongs = Arc::new(AtomicU64::new(0));

        // Writer task: forward the outgoing queue to the socket
        let (outgoing, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_connected = connected.clone();
        let writer = tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if let Err(e) = ws_writer.send(Message::Binary(bytes.into())).await {
                    log::warn!("Relay write failed: {e}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
            writer_connected.store(false, Ordering::SeqCst);
        });

        // Reader task: publish relayed messages into the local mirror
        let reader_mirror = mirror.clone();
        let reader_connected = connected.clone();
        let reader_pongs = pongs.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match RelayFrame::decode(&bytes) {
                            Ok(frame) => match frame.kind {
                                FrameKind::Message => {
                                    reader_mirror.publish_raw(&frame.topic, Arc::new(frame.payload));
                                }
                                FrameKind::Pong => {
                                    reader_pongs.fetch_add(1, Ordering::Relaxed);
                                }
                                other => log::debug!("Ignoring {other:?} frame from relay"),
                            },
                            Err(e) => log::warn!("Failed to decode relay frame: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Relay connection error: {e}");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            log::info!("Relay connection closed");
        });

        log::info!("Connected to relay at {url}");
        Ok(Self {
            url,
            outgoing,
            mirror,
            refs: Arc::new(Mutex::new(HashMap::new())),
            connected,
            pongs,
            writer,
            reader,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Send a ping frame; the matching pong bumps [`pong_count`](Self::pong_count).
    pub fn ping(&self) -> bool {
        send_frame(&self.outgoing, &RelayFrame::ping()).is_ok()
    }

    pub fn pong_count(&self) -> u64 {
        self.pongs.load(Ordering::Relaxed)
    }

    /// Topics with at least one local subscriber.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
        let mut topics: Vec<String> = refs.keys().cloned().collect();
        topics.sort();
        topics
    }
}

/// Queue `frame` for the writer task. `ConnectionClosed` once the writer
/// has exited and dropped its end of the queue.
fn send_frame(outgoing: &mpsc::UnboundedSender<Vec<u8>>, frame: &RelayFrame) -> Result<(), ProtocolError> {
    let bytes = frame.encode()?;
    outgoing
        .send(bytes)
        .map_err(|_| ProtocolError::ConnectionClosed)
}

impl PubSub for RelayClient {
    /// The relay is the only receiver seen from here; returns 1 once queued.
    fn publish(&self, topic: &str, message: Vec<u8>) -> Result<usize, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::Transport(format!("not connected to {}", self.url)));
        }
        send_frame(&self.outgoing, &RelayFrame::publish(topic, message))?;
        Ok(1)
    }

    fn subscribe(&self, topic: &str) -> Subscription {
        let receiver = self.mirror.channel(topic).receiver();

        let first = {
            let mut refs = self.refs.lock().unwrap_or_else(PoisonError::into_inner);
            let count = refs.entry(topic.to_string()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            if let Err(e) = send_frame(&self.outgoing, &RelayFrame::subscribe(topic)) {
                log::warn!("Subscribe to {topic} not sent: {e}");
            }
        }

        let refs = self.refs.clone();
        let outgoing = self.outgoing.clone();
        let owned_topic = topic.to_string();
        Subscription::new(topic, receiver).on_release(move || {
            let last = {
                let mut refs = refs.lock().unwrap_or_else(PoisonError::into_inner);
                match refs.get_mut(&owned_topic) {
                    Some(count) if *count > 1 => {
                        *count -= 1;
                        false
                    }
                    Some(_) => {
                        refs.remove(&owned_topic);
                        true
                    }
                    None => false,
                }
            };
            if last {
                // The connection may already be gone; nothing left to tell.
                let _ = send_frame(&outgoing, &RelayFrame::unsubscribe(owned_topic.as_str()));
            }
        })
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}
