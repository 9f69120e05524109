//! MessageStore port - Persistence collaborator for live chat messages.

use async_trait::async_trait;

use crate::domain::chat::QueuedMessage;
use crate::domain::foundation::DomainError;

/// Port for writing chat messages to durable storage.
///
/// Called from the persistence worker pool. Implementations should treat
/// `message.id` as an idempotency key; the live path is at-least-once.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message.
    async fn create_message(&self, message: &QueuedMessage) -> Result<(), DomainError>;
}
