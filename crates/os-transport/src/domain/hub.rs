//! # Topic Hub
//!
//! Per-topic fan-out of accepted messages, one `tokio::sync::broadcast`
//! channel per topic. The topic set is fixed at construction. Closing the
//! hub drops every sender, which ends all outstanding subscriptions.

use crate::ports::Subscription;
use parking_lot::RwLock;
use shared_types::{ReceivedMessage, TopicSet};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Messages buffered per subscriber before it starts lagging.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct TopicHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ReceivedMessage>>>,
}

impl TopicHub {
    #[must_use]
    pub fn new(topics: &TopicSet) -> Self {
        Self::with_capacity(topics, DEFAULT_TOPIC_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(topics: &TopicSet, capacity: usize) -> Self {
        let channels = topics
            .names()
            .map(|name| (name.to_string(), broadcast::channel(capacity).0))
            .collect();
        Self {
            channels: RwLock::new(channels),
        }
    }

    /// Subscribe to `topic`. Unknown topics (or a closed hub) yield an
    /// empty subscription.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> Subscription {
        match self.channels.read().get(topic) {
            Some(sender) => Subscription::from_receiver(topic, sender.subscribe()),
            None => Subscription::empty(),
        }
    }

    /// Deliver `message` to subscribers of its topic.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, message: ReceivedMessage) -> usize {
        let topic = message.envelope.topic.clone();
        let channels = self.channels.read();
        let Some(sender) = channels.get(&topic) else {
            debug!(topic = %topic, "Dropping message for unknown topic");
            return 0;
        };
        match sender.send(message) {
            Ok(receivers) => {
                trace!(topic = %topic, receivers, "Message delivered");
                receivers
            }
            Err(_) => {
                trace!(topic = %topic, "No subscribers for message");
                0
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// End every subscription.
    pub fn close(&self) {
        self.channels.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{default_topics, Address, Envelope, Signature, TOPIC_GREET, TOPIC_PRICE};

    fn received(topic: &str) -> ReceivedMessage {
        ReceivedMessage::new(
            Envelope {
                topic: topic.to_string(),
                body: b"hello".to_vec(),
                timestamp: 1,
                author: Address::ZERO,
                signature: Signature([0u8; 65]),
                meta: Default::default(),
            },
            "test",
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_topic_subscribers_only() {
        let hub = TopicHub::new(&default_topics());
        let mut price = hub.subscribe(TOPIC_PRICE);
        let mut greet = hub.subscribe(TOPIC_GREET);

        assert_eq!(hub.publish(received(TOPIC_PRICE)), 1);
        assert_eq!(price.recv().await.unwrap().envelope.topic, TOPIC_PRICE);

        hub.close();
        assert!(greet.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let hub = TopicHub::new(&default_topics());
        assert_eq!(hub.publish(received("nope/v1")), 0);
        assert!(hub.subscribe("nope/v1").recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let hub = TopicHub::new(&default_topics());
        let mut sub = hub.subscribe(TOPIC_PRICE);
        hub.close();
        assert!(hub.is_closed());
        assert!(sub.recv().await.is_none());
    }
}
