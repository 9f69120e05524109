//! CallRepository port - Durable storage of call records.

use async_trait::async_trait;

use crate::domain::call::{Call, CallError, CallStatus, UserPair};
use crate::domain::foundation::{CallId, Timestamp};

/// Port for persisting call records.
///
/// The store is the linearization point for call status: implementations
/// must apply `update_status` atomically and only when the stored status
/// equals `from`, so two front-end processes racing on the same call see
/// exactly one winner.
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Insert a new call record.
    async fn create(&self, call: &Call) -> Result<(), CallError>;

    /// Conditionally move a call from `from` to `to`.
    ///
    /// Timestamps that are `None` leave the stored column untouched.
    ///
    /// # Errors
    ///
    /// `CallError::InvalidTransition` when no record with that id and status
    /// `from` exists (zero rows affected). Never silently ignored.
    async fn update_status(
        &self,
        call_id: CallId,
        from: CallStatus,
        to: CallStatus,
        answered_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> Result<(), CallError>;

    /// Find the open (initiated, ringing or active) call for a normalized pair.
    async fn get_active_by_user_pair(&self, pair: &UserPair) -> Result<Option<Call>, CallError>;

    /// Fetch a call by id.
    ///
    /// # Errors
    ///
    /// `CallError::NotFound` when no such record exists.
    async fn get_by_id(&self, id: CallId) -> Result<Call, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn CallRepository) {}
}
