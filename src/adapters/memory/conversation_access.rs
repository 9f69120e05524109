//! In-memory conversation membership.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{ConversationId, DomainError, UserId};
use crate::ports::ConversationAccess;

#[derive(Default)]
pub struct InMemoryConversationAccess {
    participants: RwLock<HashMap<ConversationId, HashSet<UserId>>>,
}

impl InMemoryConversationAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_participant(&self, conversation_id: ConversationId, user_id: UserId) {
        self.participants
            .write()
            .expect("participants lock poisoned")
            .entry(conversation_id)
            .or_default()
            .insert(user_id);
    }
}

#[async_trait]
impl ConversationAccess for InMemoryConversationAccess {
    async fn is_participant(
        &self,
        user_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<bool, DomainError> {
        Ok(self
            .participants
            .read()
            .expect("participants lock poisoned")
            .get(conversation_id)
            .is_some_and(|members| members.contains(user_id)))
    }
}
