//! Call state machine over the call repository.
//!
//! Knows nothing about sockets. Every status change is a compare-and-swap
//! against the store, which is the only linearization point when several
//! front-end processes act on the same call.

use std::sync::Arc;

use crate::domain::call::{Call, CallError, CallRole, CallStatus, UserPair};
use crate::domain::foundation::{CallId, StateMachine, Timestamp, UserId};
use crate::ports::CallRepository;

pub struct CallStateMachine {
    repository: Arc<dyn CallRepository>,
}

impl CallStateMachine {
    pub fn new(repository: Arc<dyn CallRepository>) -> Self {
        Self { repository }
    }

    /// Returns the open call between two users, creating one if none exists.
    ///
    /// The role is `user_a`'s slot in the normalized pair.
    pub async fn create_or_join(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<(Call, CallRole), CallError> {
        let pair = UserPair::normalized(user_a.clone(), user_b)?;
        let role = if &user_a == pair.caller() {
            CallRole::Caller
        } else {
            CallRole::Callee
        };

        if let Some(call) = self.repository.get_active_by_user_pair(&pair).await? {
            tracing::debug!(call_id = %call.id, user_id = %user_a, "Joined open call");
            return Ok((call, role));
        }

        let call = Call::initiate(pair.clone(), user_a);
        match self.repository.create(&call).await {
            Ok(()) => {
                tracing::info!(call_id = %call.id, caller = %call.caller_id, callee = %call.callee_id, "Call created");
                Ok((call, role))
            }
            // A concurrent create for the same pair may have won.
            Err(CallError::Storage(reason)) => match self.repository.get_active_by_user_pair(&pair).await? {
                Some(existing) => Ok((existing, role)),
                None => Err(CallError::Storage(reason)),
            },
            Err(e) => Err(e),
        }
    }

    /// Conditionally moves a call from `from` to `to`.
    ///
    /// Edges outside the call lifecycle are refused without touching the
    /// store; a stored status other than `from` surfaces as
    /// `CallError::InvalidTransition` and is never retried.
    pub async fn update_status(
        &self,
        call_id: CallId,
        from: CallStatus,
        to: CallStatus,
        answered_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> Result<(), CallError> {
        if !from.can_transition_to(&to) {
            return Err(CallError::InvalidTransition { call_id, from, to });
        }
        self.repository
            .update_status(call_id, from, to, answered_at, ended_at)
            .await?;
        tracing::info!(call_id = %call_id, from = %from, to = %to, "Call status changed");
        Ok(())
    }

    pub async fn get_by_id(&self, call_id: CallId) -> Result<Call, CallError> {
        self.repository.get_by_id(call_id).await
    }
}
