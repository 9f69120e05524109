//! In-memory broker for tests and single-process development.
//!
//! # Panics
//!
//! Methods panic if the internal lock is poisoned. Not for production use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::ports::{BrokerError, BrokerSubscription, PubSubBroker};

/// Process-local broker with the same topic semantics as Redis pub/sub.
///
/// Payloads published before a subscription exists are not retained.
#[derive(Default)]
pub struct InMemoryBroker {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<String>>>>,
    fail_subscribes: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Number of live subscriptions on `topic`.
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .expect("broker lock poisoned")
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Makes subsequent `subscribe` calls fail.
    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Ends every subscription on `topic`, as a dropped broker connection would.
    pub fn disconnect_topic(&self, topic: &str) {
        self.topics.lock().expect("broker lock poisoned").remove(topic);
    }
}

#[async_trait]
impl PubSubBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        let mut topics = self.topics.lock().expect("broker lock poisoned");
        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BrokerSubscription, BrokerError> {
        if self.fail_subscribes.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("subscribe disabled".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.topics
            .lock()
            .expect("broker lock poisoned")
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|payload| (payload, rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_receives_in_publish_order() {
        let broker = InMemoryBroker::new();
        let mut a = broker.subscribe("t").await.unwrap();
        let mut b = broker.subscribe("t").await.unwrap();

        broker.publish("t", "1".into()).await.unwrap();
        broker.publish("t", "2".into()).await.unwrap();

        assert_eq!(a.next().await.as_deref(), Some("1"));
        assert_eq!(a.next().await.as_deref(), Some("2"));
        assert_eq!(b.next().await.as_deref(), Some("1"));
        assert_eq!(broker.subscription_count("t"), 2);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let broker = InMemoryBroker::new();
        broker.publish("t", "lost".into()).await.unwrap();

        let mut sub = broker.subscribe("t").await.unwrap();
        broker.publish("t", "kept".into()).await.unwrap();
        assert_eq!(sub.next().await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn dropped_subscription_is_not_counted() {
        let broker = InMemoryBroker::new();
        let sub = broker.subscribe("t").await.unwrap();
        drop(sub);
        assert_eq!(broker.subscription_count("t"), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_the_stream() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe("t").await.unwrap();
        broker.disconnect_topic("t");
        assert_eq!(sub.next().await, None);
    }
}
