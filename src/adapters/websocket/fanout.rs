//! Fanout bridge between the broker and the local topic registry.
//!
//! Every chat message is published to the broker, never delivered locally
//! first; each process then receives it on its own subscription and hands it
//! to its registry. That keeps one delivery path for same-process and
//! cross-process subscribers.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::domain::foundation::UserId;
use crate::ports::{BrokerError, PubSubBroker};

use super::hub::{Exclude, TopicRegistry};

/// Bridges broker topics onto the local [`TopicRegistry`].
#[derive(Clone)]
pub struct FanoutBridge {
    broker: Arc<dyn PubSubBroker>,
    registry: TopicRegistry,
    subscribed: Arc<Mutex<HashSet<String>>>,
}

impl FanoutBridge {
    pub fn new(broker: Arc<dyn PubSubBroker>, registry: TopicRegistry) -> Self {
        Self {
            broker,
            registry,
            subscribed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Publishes a payload to every process subscribed to `topic`.
    pub async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        self.broker.publish(topic, payload).await
    }

    /// Ensures this process holds a broker subscription for `topic`.
    ///
    /// Idempotent: concurrent and repeated calls open at most one
    /// subscription per topic.
    pub async fn subscribe_topic(&self, topic: &str) -> Result<(), BrokerError> {
        {
            let mut subscribed = self.subscribed.lock().await;
            if !subscribed.insert(topic.to_string()) {
                return Ok(());
            }
        }

        let stream = match self.broker.subscribe(topic).await {
            Ok(stream) => stream,
            Err(e) => {
                self.subscribed.lock().await.remove(topic);
                return Err(e);
            }
        };

        tracing::info!(topic = %topic, "Subscribed to broker topic");

        let registry = self.registry.clone();
        let subscribed = self.subscribed.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            let mut stream = stream;
            while let Some(payload) = stream.next().await {
                let exclude = sender_of(&payload).map_or(Exclude::Nobody, Exclude::User);
                registry.broadcast_local(topic.as_str(), payload, exclude).await;
            }
            tracing::warn!(topic = %topic, "Broker subscription ended");
            subscribed.lock().await.remove(&topic);
        });

        Ok(())
    }

    /// Topics this process currently holds a broker subscription for.
    pub async fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscribed.lock().await.iter().cloned().collect();
        topics.sort();
        topics
    }
}

/// Extracts `sender_id` from a JSON object payload, for echo suppression.
///
/// Accepts string or numeric ids. Anything else means no exclusion.
fn sender_of(payload: &str) -> Option<UserId> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let sender = match value.get("sender_id")? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    UserId::new(sender).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pubsub::InMemoryBroker;
    use crate::adapters::websocket::connection::{connection, OutboundQueue};
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    async fn recv(queue: &mut OutboundQueue) -> Option<String> {
        tokio::time::timeout(Duration::from_millis(200), queue.next())
            .await
            .ok()
            .flatten()
    }

    #[test]
    fn sender_is_read_from_string_or_number() {
        assert_eq!(sender_of(r#"{"sender_id":"alice"}"#), Some(user("alice")));
        assert_eq!(sender_of(r#"{"sender_id":42}"#), Some(user("42")));
        assert_eq!(sender_of(r#"{"sender_id":null}"#), None);
        assert_eq!(sender_of("not json"), None);
        assert_eq!(sender_of(r#"["sender_id"]"#), None);
    }

    #[tokio::test]
    async fn subscribe_topic_is_idempotent() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = FanoutBridge::new(broker.clone(), TopicRegistry::spawn(16));

        bridge.subscribe_topic("conversation_1").await.unwrap();
        bridge.subscribe_topic("conversation_1").await.unwrap();

        assert_eq!(broker.subscription_count("conversation_1"), 1);
        assert_eq!(bridge.subscribed_topics().await, vec!["conversation_1".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_subscribes_open_one_broker_subscription() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = FanoutBridge::new(broker.clone(), TopicRegistry::spawn(16));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let bridge = bridge.clone();
                tokio::spawn(async move { bridge.subscribe_topic("t").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(broker.subscription_count("t"), 1);
    }

    #[tokio::test]
    async fn published_payload_reaches_other_users_but_not_the_sender() {
        let broker = Arc::new(InMemoryBroker::new());
        let registry = TopicRegistry::spawn(16);
        let bridge = FanoutBridge::new(broker, registry.clone());

        let (alice, mut alice_queue) = connection(user("alice"), 8);
        let (bob, mut bob_queue) = connection(user("bob"), 8);
        for handle in [&alice, &bob] {
            registry.register(handle.clone()).await;
            registry.subscribe(handle.id(), "conversation_7").await;
        }
        bridge.subscribe_topic("conversation_7").await.unwrap();

        let payload = r#"{"sender_id":"alice","content":"hi"}"#.to_string();
        bridge.publish("conversation_7", payload.clone()).await.unwrap();

        assert_eq!(recv(&mut bob_queue).await, Some(payload));
        assert_eq!(recv(&mut alice_queue).await, None);
    }

    #[tokio::test]
    async fn two_bridges_share_one_broker() {
        let broker = Arc::new(InMemoryBroker::new());
        let (registry_a, registry_b) = (TopicRegistry::spawn(16), TopicRegistry::spawn(16));
        let bridge_a = FanoutBridge::new(broker.clone(), registry_a);
        let bridge_b = FanoutBridge::new(broker.clone(), registry_b.clone());

        let (bob, mut bob_queue) = connection(user("bob"), 8);
        registry_b.register(bob.clone()).await;
        registry_b.subscribe(bob.id(), "t").await;
        bridge_a.subscribe_topic("t").await.unwrap();
        bridge_b.subscribe_topic("t").await.unwrap();

        bridge_a
            .publish("t", r#"{"sender_id":"alice"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(
            recv(&mut bob_queue).await.as_deref(),
            Some(r#"{"sender_id":"alice"}"#)
        );
    }

    #[tokio::test]
    async fn lost_subscription_is_forgotten_so_it_can_be_reopened() {
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = FanoutBridge::new(broker.clone(), TopicRegistry::spawn(16));

        bridge.subscribe_topic("t").await.unwrap();
        broker.disconnect_topic("t");

        for _ in 0..50 {
            if bridge.subscribed_topics().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(bridge.subscribed_topics().await.is_empty());

        bridge.subscribe_topic("t").await.unwrap();
        assert_eq!(broker.subscription_count("t"), 1);
    }

    #[tokio::test]
    async fn failed_subscribe_can_be_retried() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_subscribes(true);
        let bridge = FanoutBridge::new(broker.clone(), TopicRegistry::spawn(16));

        assert!(bridge.subscribe_topic("t").await.is_err());
        assert!(bridge.subscribed_topics().await.is_empty());

        broker.fail_subscribes(false);
        bridge.subscribe_topic("t").await.unwrap();
        assert_eq!(broker.subscription_count("t"), 1);
    }
}
