use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Messages buffered per channel before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 1024;

/// Published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Pub/Sub statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PubSubStats {
    pub total_channels: usize,
    pub messages_published: u64,
    pub messages_delivered: u64,
}

/// Pub/Sub Router - channel based fire-and-forget notifications
///
/// Publishing has no durable effect: a message reaches whoever is
/// subscribed at that moment and is then gone.
#[derive(Clone, Default)]
pub struct PubSubRouter {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Message>>>>,
    stats: Arc<RwLock<PubSubStats>>,
}

impl PubSubRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a channel
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Message> {
        let mut channels = self.channels.write();
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let receiver = sender.subscribe();

        self.stats.write().total_channels = channels.len();
        receiver
    }

    /// Publish a message, returning how many subscribers received it
    pub fn publish(&self, channel: &str, payload: Vec<u8>) -> usize {
        let delivered = {
            let channels = self.channels.read();
            match channels.get(channel) {
                Some(sender) => sender
                    .send(Message {
                        channel: channel.to_string(),
                        payload,
                    })
                    .unwrap_or(0),
                None => 0,
            }
        };

        if delivered == 0 {
            self.prune(channel);
        }

        let mut stats = self.stats.write();
        stats.messages_published += 1;
        stats.messages_delivered += delivered as u64;

        debug!("PUBLISH channel={}, delivered={}", channel, delivered);
        delivered
    }

    pub fn stats(&self) -> PubSubStats {
        self.stats.read().clone()
    }

    /// Drop a channel nobody listens to anymore
    fn prune(&self, channel: &str) {
        let mut channels = self.channels.write();
        if channels
            .get(channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(channel);
            self.stats.write().total_channels = channels.len();
        }
    }
}
