//! Topic-addressed fan-out with backpressure.
//!
//! Each topic (e.g. `canvas:{project}`) owns one tokio broadcast channel.
//! Every subscriber gets an independent receiver that buffers up to
//! `capacity` messages; a lagging subscriber drops the oldest ones.
//!
//! Delivery includes the publisher's own subscription. Recognising echoes is
//! the subscriber's job (see `CanvasEnvelope::origin_session_id`).

use folio_core::{PubSub, StoreError, Subscription};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Statistics for monitoring topic health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Publications that found no subscriber.
    pub messages_dropped: u64,
    pub subscribers: usize,
}

/// Lock-free counters on the publish path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// The broadcast channel behind one topic.
pub struct TopicChannel {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    capacity: usize,
    stats: AtomicBroadcastStats,
}

impl TopicChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity,
            stats: AtomicBroadcastStats::new(),
        }
    }

    /// Send pre-encoded bytes to every current receiver.
    /// Returns the number of receivers reached.
    pub fn publish(&self, message: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(message).unwrap_or(0);
        if count == 0 {
            self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    pub fn receiver(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

/// In-process pub/sub: maps topic names to channels created on demand.
pub struct TopicBus {
    topics: RwLock<HashMap<String, Arc<TopicChannel>>>,
    capacity: usize,
}

impl TopicBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Get or create the channel for `topic`.
    pub fn channel(&self, topic: &str) -> Arc<TopicChannel> {
        // Fast path: read lock
        {
            let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(channel) = topics.get(topic) {
                return channel.clone();
            }
        }

        // Slow path: double-check under the write lock
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = topics.get(topic) {
            return channel.clone();
        }
        let channel = Arc::new(TopicChannel::new(self.capacity));
        topics.insert(topic.to_string(), channel.clone());
        log::debug!("Created topic {}", topic);
        channel
    }

    fn existing(&self, topic: &str) -> Option<Arc<TopicChannel>> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.get(topic).cloned()
    }

    /// Publish to `topic`. A topic nobody ever subscribed to reaches no one.
    pub fn publish_raw(&self, topic: &str, message: Arc<Vec<u8>>) -> usize {
        match self.existing(topic) {
            Some(channel) => channel.publish(message),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.existing(topic).map_or(0, |c| c.subscriber_count())
    }

    pub fn stats(&self, topic: &str) -> Option<BroadcastStats> {
        self.existing(topic).map(|c| c.stats())
    }

    /// Drop `topic` if it has no subscribers left.
    pub fn remove_if_idle(&self, topic: &str) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        if topics.get(topic).is_some_and(|c| c.subscriber_count() == 0) {
            topics.remove(topic);
            log::debug!("Removed idle topic {}", topic);
            return true;
        }
        false
    }

    /// Drop every topic without subscribers. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let before = topics.len();
        topics.retain(|_, channel| channel.subscriber_count() > 0);
        before - topics.len()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn active_topics(&self) -> Vec<String> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.keys().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl PubSub for TopicBus {
    fn publish(&self, topic: &str, message: Vec<u8>) -> Result<usize, StoreError> {
        Ok(self.publish_raw(topic, Arc::new(message)))
    }

    fn subscribe(&self, topic: &str) -> Subscription {
        Subscription::new(topic, self.channel(topic).receiver())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_includes_publisher() {
        let bus = TopicBus::new(16);
        let mut a = bus.subscribe("canvas:1");
        let mut b = bus.subscribe("canvas:1");
        let mut c = bus.subscribe("canvas:1");

        let count = bus.publish("canvas:1", vec![1, 2, 3]).unwrap();
        assert_eq!(count, 3);
        for sub in [&mut a, &mut b, &mut c] {
            assert_eq!(sub.recv().await.unwrap().as_slice(), &[1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = TopicBus::new(16);
        let mut one = bus.subscribe("canvas:1");
        let _two = bus.subscribe("canvas:2");

        assert_eq!(bus.publish("canvas:2", vec![9]).unwrap(), 1);
        assert_eq!(bus.publish("canvas:1", vec![1]).unwrap(), 1);
        assert_eq!(one.recv().await.unwrap().as_slice(), &[1]);
        assert_eq!(bus.topic_count(), 2);
    }

    #[test]
    fn test_channel_get_or_create() {
        let bus = TopicBus::new(16);
        let first = bus.channel("t");
        let second = bus.channel("t");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(bus.topic_count(), 1);
        assert_eq!(first.capacity(), 16);
    }

    #[test]
    fn test_publish_unknown_topic() {
        let bus = TopicBus::new(4);
        assert_eq!(bus.publish("nobody", vec![1]).unwrap(), 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn test_stats() {
        let bus = TopicBus::new(4);
        let sub = bus.subscribe("t");
        bus.publish("t", vec![1]).unwrap();
        bus.publish("t", vec![2]).unwrap();
        drop(sub);
        bus.publish("t", vec![3]).unwrap();

        let stats = bus.stats("t").unwrap();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.subscribers, 0);
    }

    #[test]
    fn test_idle_cleanup() {
        let bus = TopicBus::new(4);
        let sub = bus.subscribe("busy");
        let idle = bus.subscribe("idle");
        drop(idle);

        assert!(!bus.remove_if_idle("busy"));
        assert!(bus.remove_if_idle("idle"));
        assert_eq!(bus.active_topics(), vec!["busy".to_string()]);

        drop(sub);
        assert_eq!(bus.prune_idle(), 1);
        assert_eq!(bus.topic_count(), 0);
    }
}
