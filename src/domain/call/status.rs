//! Call status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of a call.
///
/// ```text
/// initiated ──► ringing ──► active ──► ended
///     │            │
///     │            ├──► rejected
///     ▼            ▼
///   missed ◄───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Active,
    Ended,
    Rejected,
    Missed,
}

impl CallStatus {
    /// Statuses that count as "a call is in progress between the pair".
    pub const OPEN: [CallStatus; 3] = [CallStatus::Initiated, CallStatus::Ringing, CallStatus::Active];

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
            CallStatus::Rejected => "rejected",
            CallStatus::Missed => "missed",
        }
    }

    /// Returns true while the call still occupies the pair.
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl StateMachine for CallStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use CallStatus::*;
        matches!(
            (self, target),
            (Initiated, Ringing)
                | (Initiated, Missed)
                | (Ringing, Active)
                | (Ringing, Rejected)
                | (Ringing, Missed)
                | (Active, Ended)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use CallStatus::*;
        match self {
            Initiated => vec![Ringing, Missed],
            Ringing => vec![Active, Rejected, Missed],
            Active => vec![Ended],
            Ended | Rejected | Missed => vec![],
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(CallStatus::Initiated),
            "ringing" => Ok(CallStatus::Ringing),
            "active" => Ok(CallStatus::Active),
            "ended" => Ok(CallStatus::Ended),
            "rejected" => Ok(CallStatus::Rejected),
            "missed" => Ok(CallStatus::Missed),
            other => Err(ValidationError::invalid_format(
                "call_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}
