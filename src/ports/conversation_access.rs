//! ConversationAccess port - Conversation membership checks.

use async_trait::async_trait;

use crate::domain::foundation::{ConversationId, DomainError, UserId};

/// Port answering "may this user join this conversation's live socket".
#[async_trait]
pub trait ConversationAccess: Send + Sync {
    /// Returns true if the user participates in the conversation.
    async fn is_participant(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<bool, DomainError>;
}
