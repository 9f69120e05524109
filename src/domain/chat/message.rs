//! Chat message types.
//!
//! A [`ChatFrame`] is what a client writes on the chat socket. The server
//! stamps it with identity and conversation into a [`QueuedMessage`], which
//! is both what the persistence pool stores and what the fanout publishes.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, MessageId, Timestamp, UserId, ValidationError};

/// Kind of content carried by a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    File,
}

impl MessageType {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::File => "file",
        }
    }
}

/// Inbound chat frame as written by the client.
///
/// Sender and conversation are never taken from the client; they come from
/// the authenticated session and the connection's query string.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatFrame {
    pub content: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ChatFrame {
    /// Parses and validates a raw text frame.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let frame: ChatFrame = serde_json::from_str(text)
            .map_err(|e| ValidationError::invalid_format("chat_frame", e.to_string()))?;
        if frame.content.trim().is_empty() {
            return Err(ValidationError::empty_field("content"));
        }
        Ok(frame)
    }
}

/// A chat message accepted from a live socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

impl QueuedMessage {
    /// Stamps a client frame with its sender and conversation.
    pub fn from_frame(frame: ChatFrame, conversation_id: ConversationId, sender_id: UserId) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id,
            sender_id,
            content: frame.content,
            message_type: frame.message_type,
            metadata: frame.metadata,
            created_at: Timestamp::now(),
        }
    }
}
