//! In-memory call repository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::call::{Call, CallError, CallStatus, UserPair};
use crate::domain::foundation::{CallId, Timestamp};
use crate::ports::CallRepository;

/// Call records held in a map; the mutex makes each update atomic.
#[derive(Default)]
pub struct InMemoryCallRepository {
    calls: Mutex<HashMap<CallId, Call>>,
}

impl InMemoryCallRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub fn len(&self) -> usize {
        self.calls.lock().expect("call store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CallRepository for InMemoryCallRepository {
    async fn create(&self, call: &Call) -> Result<(), CallError> {
        let mut calls = self.calls.lock().expect("call store lock poisoned");
        if calls.contains_key(&call.id) {
            return Err(CallError::Storage(format!("duplicate call id {}", call.id)));
        }
        // Mirrors the partial unique index on open calls per pair.
        let open_pair = calls.values().any(|c| {
            c.status.is_open() && c.caller_id == call.caller_id && c.callee_id == call.callee_id
        });
        if call.status.is_open() && open_pair {
            return Err(CallError::Storage(format!(
                "open call already exists for {} and {}",
                call.caller_id, call.callee_id
            )));
        }
        calls.insert(call.id, call.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        call_id: CallId,
        from: CallStatus,
        to: CallStatus,
        answered_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> Result<(), CallError> {
        let mut calls = self.calls.lock().expect("call store lock poisoned");
        match calls.get_mut(&call_id) {
            Some(call) => call.apply_transition(from, to, answered_at, ended_at),
            // Same outcome as a conditional UPDATE matching zero rows.
            None => Err(CallError::InvalidTransition { call_id, from, to }),
        }
    }

    async fn get_active_by_user_pair(&self, pair: &UserPair) -> Result<Option<Call>, CallError> {
        let calls = self.calls.lock().expect("call store lock poisoned");
        Ok(calls
            .values()
            .filter(|c| &c.caller_id == pair.caller() && &c.callee_id == pair.callee())
            .filter(|c| c.status.is_open())
            .max_by_key(|c| c.initiated_at)
            .cloned())
    }

    async fn get_by_id(&self, id: CallId) -> Result<Call, CallError> {
        self.calls
            .lock()
            .expect("call store lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(CallError::NotFound(id))
    }
}
