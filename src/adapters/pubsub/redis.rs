//! Redis pub/sub broker for multi-process deployments.
//!
//! Publishing goes through one shared multiplexed connection. Redis puts a
//! connection into subscriber mode on SUBSCRIBE, so every subscribed topic
//! gets its own dedicated connection.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::ports::{BrokerError, BrokerSubscription, PubSubBroker};

/// Redis-backed [`PubSubBroker`].
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisBroker {
    /// Opens the shared publish connection.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client =
            redis::Client::open(url).map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl PubSubBroker for RedisBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(topic, payload)
            .await
            .map_err(|e: redis::RedisError| BrokerError::Publish(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> Result<BrokerSubscription, BrokerError> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(topic)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        let topic = topic.to_string();
        let stream = pubsub
            .into_on_message()
            .filter_map(move |msg| {
                let payload = match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(topic = %topic, error = %e, "Dropping undecodable broker payload");
                        None
                    }
                };
                futures::future::ready(payload)
            })
            .boxed();

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result = RedisBroker::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(BrokerError::Unavailable(_))));
    }

    // Integration tests against a live Redis belong in a separate suite:
    //
    // #[tokio::test]
    // async fn publish_reaches_subscriber() {
    //     let broker = RedisBroker::connect("redis://127.0.0.1/").await.unwrap();
    //     let mut sub = broker.subscribe("t").await.unwrap();
    //     broker.publish("t", "x".into()).await.unwrap();
    //     assert_eq!(sub.next().await.as_deref(), Some("x"));
    // }
}
