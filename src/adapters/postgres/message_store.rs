//! PostgreSQL implementation of MessageStore and ConversationAccess.
//!
//! Inserts are keyed by the message id assigned at ingest, so a redelivered
//! message is written once.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::chat::QueuedMessage;
use crate::domain::foundation::{ConversationId, DomainError, UserId};
use crate::ports::{ConversationAccess, MessageStore};

#[derive(Clone)]
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn create_message(&self, message: &QueuedMessage) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender_id, content, message_type, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.conversation_id.as_str())
        .bind(message.sender_id.as_str())
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.metadata.as_ref().map(sqlx::types::Json))
        .bind(message.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to insert message", e))?;

        Ok(())
    }
}

#[async_trait]
impl ConversationAccess for PostgresMessageStore {
    async fn is_participant(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to check participation", e))
    }
}
