//! Call lifecycle errors.

use thiserror::Error;

use crate::domain::foundation::{CallId, DomainError, ErrorCode, UserId};

use super::CallStatus;

/// Errors raised by the call state machine and its repository.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The conditional update matched zero rows: the stored status was not `from`.
    #[error("Invalid call transition {from} -> {to} for call {call_id}")]
    InvalidTransition {
        call_id: CallId,
        from: CallStatus,
        to: CallStatus,
    },

    #[error("Call not found: {0}")]
    NotFound(CallId),

    /// A user tried to call themselves.
    #[error("A call needs two distinct users")]
    PermissionDenied,

    #[error("User {user_id} is not a party to call {call_id}")]
    Forbidden { call_id: CallId, user_id: UserId },

    #[error("Call storage failed: {0}")]
    Storage(String),
}

impl CallError {
    /// Returns true for the lost-race outcome of a conditional update.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, CallError::InvalidTransition { .. })
    }
}

impl From<CallError> for DomainError {
    fn from(err: CallError) -> Self {
        let code = match &err {
            CallError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            CallError::NotFound(_) => ErrorCode::CallNotFound,
            CallError::PermissionDenied => ErrorCode::ValidationFailed,
            CallError::Forbidden { .. } => ErrorCode::Forbidden,
            CallError::Storage(_) => ErrorCode::DatabaseError,
        };
        DomainError::new(code, err.to_string())
    }
}
