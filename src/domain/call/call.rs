//! Call record and caller/callee pair normalization.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{CallId, Timestamp, UserId};

use super::{CallError, CallStatus};

/// Canonically ordered pair of call participants.
///
/// The lexicographically smaller user id always occupies the caller slot, so
/// "is there an open call between A and B" has one answer whichever of them
/// asks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserPair {
    caller: UserId,
    callee: UserId,
}

impl UserPair {
    /// Normalizes two distinct users into a pair.
    pub fn normalized(a: UserId, b: UserId) -> Result<Self, CallError> {
        if a == b {
            return Err(CallError::PermissionDenied);
        }
        let (caller, callee) = if a <= b { (a, b) } else { (b, a) };
        Ok(Self { caller, callee })
    }

    pub fn caller(&self) -> &UserId {
        &self.caller
    }

    pub fn callee(&self) -> &UserId {
        &self.callee
    }

    /// Role the given user holds in this pair, if any.
    pub fn role_of(&self, user: &UserId) -> Option<CallRole> {
        if *user == self.caller {
            Some(CallRole::Caller)
        } else if *user == self.callee {
            Some(CallRole::Callee)
        } else {
            None
        }
    }
}

/// Position of a user within a normalized pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    Caller,
    Callee,
}

/// Durable call record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub caller_id: UserId,
    pub callee_id: UserId,
    /// Who actually placed the call; independent of the normalized slots.
    pub initiated_id: UserId,
    pub status: CallStatus,
    pub initiated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
}

impl Call {
    /// Creates a fresh call in `initiated` status.
    pub fn initiate(pair: UserPair, initiator: UserId) -> Self {
        Self {
            id: CallId::new(),
            caller_id: pair.caller,
            callee_id: pair.callee,
            initiated_id: initiator,
            status: CallStatus::Initiated,
            initiated_at: Timestamp::now(),
            answered_at: None,
            ended_at: None,
        }
    }

    /// Returns true if the user is either slot of the call.
    pub fn is_party(&self, user: &UserId) -> bool {
        self.caller_id == *user || self.callee_id == *user
    }

    /// The party who did not place the call.
    pub fn recipient(&self) -> &UserId {
        if self.initiated_id == self.caller_id {
            &self.callee_id
        } else {
            &self.caller_id
        }
    }

    /// The other party relative to `user`.
    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        if *user == self.caller_id {
            Some(&self.callee_id)
        } else if *user == self.callee_id {
            Some(&self.caller_id)
        } else {
            None
        }
    }

    /// Applies a status change in memory, enforcing the compare-and-swap rule.
    ///
    /// Storage adapters that cannot express a conditional update natively
    /// use this to get the same semantics.
    pub fn apply_transition(
        &mut self,
        from: CallStatus,
        to: CallStatus,
        answered_at: Option<Timestamp>,
        ended_at: Option<Timestamp>,
    ) -> Result<(), CallError> {
        if self.status != from {
            return Err(CallError::InvalidTransition {
                call_id: self.id,
                from,
                to,
            });
        }
        self.status = to;
        if answered_at.is_some() {
            self.answered_at = answered_at;
        }
        if ended_at.is_some() {
            self.ended_at = ended_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn pair_normalization_ignores_argument_order() {
        let ab = UserPair::normalized(user("alice"), user("bob")).unwrap();
        let ba = UserPair::normalized(user("bob"), user("alice")).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.caller(), &user("alice"));
        assert_eq!(ab.callee(), &user("bob"));
    }

    #[test]
    fn pair_of_same_user_is_denied() {
        let err = UserPair::normalized(user("alice"), user("alice")).unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied));
    }

    #[test]
    fn role_of_reports_slot() {
        let pair = UserPair::normalized(user("bob"), user("alice")).unwrap();
        assert_eq!(pair.role_of(&user("alice")), Some(CallRole::Caller));
        assert_eq!(pair.role_of(&user("bob")), Some(CallRole::Callee));
        assert_eq!(pair.role_of(&user("carol")), None);
    }

    #[test]
    fn recipient_is_the_party_who_did_not_dial() {
        let pair = UserPair::normalized(user("bob"), user("alice")).unwrap();
        let call = Call::initiate(pair, user("bob"));
        assert_eq!(call.caller_id, user("alice"));
        assert_eq!(call.recipient(), &user("alice"));
        assert_eq!(call.counterpart(&user("alice")), Some(&user("bob")));
        assert_eq!(call.counterpart(&user("carol")), None);
    }

    #[test]
    fn apply_transition_requires_matching_from() {
        let pair = UserPair::normalized(user("a"), user("b")).unwrap();
        let mut call = Call::initiate(pair, user("a"));

        let err = call
            .apply_transition(CallStatus::Ringing, CallStatus::Active, None, None)
            .unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(call.status, CallStatus::Initiated);

        call.apply_transition(CallStatus::Initiated, CallStatus::Ringing, None, None)
            .unwrap();
        let answered = Timestamp::now();
        call.apply_transition(CallStatus::Ringing, CallStatus::Active, Some(answered), None)
            .unwrap();
        assert_eq!(call.status, CallStatus::Active);
        assert_eq!(call.answered_at, Some(answered));
        assert_eq!(call.ended_at, None);
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let pair = UserPair::normalized(user("a"), user("b")).unwrap();
        let call = Call::initiate(pair, user("a"));
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["status"], "initiated");
        assert_eq!(json["initiated_id"], "a");
        assert!(json.get("answered_at").is_none());
    }
}
