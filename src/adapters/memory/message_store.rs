//! In-memory message store with failure and stall injection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::chat::QueuedMessage;
use crate::domain::foundation::{DomainError, ErrorCode, MessageId};
use crate::ports::MessageStore;

/// Records persisted messages; duplicate ids are ignored.
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<QueuedMessage>>,
    failing: AtomicBool,
    paused: watch::Sender<bool>,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            paused: watch::channel(false).0,
        }
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub fn messages(&self) -> Vec<QueuedMessage> {
        self.messages.lock().expect("message store lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().expect("message store lock poisoned").len()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.messages
            .lock()
            .expect("message store lock poisoned")
            .iter()
            .any(|m| m.id == id)
    }

    /// Makes every write fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stalls every write until `resume` is called.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(&self, message: &QueuedMessage) -> Result<(), DomainError> {
        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|p| !*p).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(ErrorCode::DatabaseError, "injected failure"));
        }

        let mut messages = self.messages.lock().expect("message store lock poisoned");
        if !messages.iter().any(|m| m.id == message.id) {
            messages.push(message.clone());
        }
        Ok(())
    }
}
