//! PubSubBroker port - Cross-process publish/subscribe transport.
//!
//! Only the fanout bridge talks to this port. Everything else in the
//! real-time layer stays broker-agnostic and can be tested without one.

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of raw payloads received on one broker topic.
///
/// Ends when the broker connection is lost.
pub type BrokerSubscription = BoxStream<'static, String>;

/// Errors that can occur talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Broker connection could not be established or was lost.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Publish was rejected by the broker.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Subscribe was rejected by the broker.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

/// Port for a topic-based message broker (Redis in production).
#[async_trait]
pub trait PubSubBroker: Send + Sync {
    /// Publish a payload to every subscriber of `topic`, across processes.
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BrokerError>;

    /// Open a subscription to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<BrokerSubscription, BrokerError>;
}
