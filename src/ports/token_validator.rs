//! TokenValidator port - Resolves bearer tokens to user identities.
//!
//! Credential issuance lives elsewhere; the real-time layer only needs to
//! know who is on the other end of a socket.

use async_trait::async_trait;

use crate::domain::foundation::UserId;

/// Errors that can occur during token validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,
}

/// Port for validating bearer tokens.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a token and return the user it was issued to.
    async fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}
