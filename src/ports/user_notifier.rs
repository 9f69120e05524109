//! UserNotifier port - Targeted delivery to a user's live connections.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

/// Errors raised when delivering a targeted notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The user has no live connection on this process.
    #[error("User {0} is not connected")]
    NotConnected(UserId),
}

impl From<DeliveryError> for DomainError {
    fn from(err: DeliveryError) -> Self {
        DomainError::new(ErrorCode::NotConnected, err.to_string())
    }
}

/// Port for pushing a text frame to every live connection of a user.
#[async_trait]
pub trait UserNotifier: Send + Sync {
    /// Returns how many connections accepted the frame.
    ///
    /// # Errors
    ///
    /// `DeliveryError::NotConnected` when zero connections accepted it.
    async fn send_to_user(&self, user_id: &UserId, payload: &str) -> Result<usize, DeliveryError>;
}
