//! Chat ingest: validates a client frame and hands it to persistence.
//!
//! The returned message is what the socket handler publishes live. A full
//! persistence queue does not stop live delivery; the message is only lost
//! from history.

use std::sync::Arc;

use crate::domain::chat::{ChatFrame, QueuedMessage};
use crate::domain::foundation::{ConversationId, DomainError, UserId, ValidationError};

use super::{EnqueueError, MessageWriter};

/// Why a chat frame was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<IngestError> for DomainError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Invalid(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct ChatIngestService {
    writer: Arc<MessageWriter>,
}

impl ChatIngestService {
    pub fn new(writer: Arc<MessageWriter>) -> Self {
        Self { writer }
    }

    /// Parses `text`, stamps it with sender and conversation, and queues it
    /// for persistence.
    pub async fn ingest(
        &self,
        conversation_id: &ConversationId,
        sender: &UserId,
        text: &str,
    ) -> Result<QueuedMessage, IngestError> {
        let frame = ChatFrame::parse(text)?;
        let message = QueuedMessage::from_frame(frame, conversation_id.clone(), sender.clone());

        match self.writer.enqueue(message.clone()).await {
            Ok(()) => {}
            Err(EnqueueError::QueueFull) => {
                tracing::warn!(
                    message_id = %message.id,
                    conversation_id = %conversation_id,
                    "Message delivered live but not persisted"
                );
            }
            Err(EnqueueError::Closed) => {
                tracing::error!(message_id = %message.id, "Message writer is shut down");
            }
        }

        Ok(message)
    }
}
