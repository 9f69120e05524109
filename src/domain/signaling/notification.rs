//! Server-to-client signaling notifications.
//!
//! Every targeted event a user receives on the notification socket is a
//! `{ "event": ..., "data": ... }` envelope built here.

use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::call::Call;
use crate::domain::foundation::{CallId, Timestamp, UserId};

/// Which WebRTC negotiation step a relayed frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

impl RelayKind {
    /// Event name used on the wire in both directions.
    pub fn event_name(&self) -> &'static str {
        match self {
            RelayKind::Offer => "webrtc_offer",
            RelayKind::Answer => "webrtc_answer",
            RelayKind::IceCandidate => "ice_candidate",
        }
    }
}

/// A server-to-client notification envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub event: &'static str,
    pub data: Value,
}

impl Notification {
    pub fn incoming_call(call: &Call) -> Self {
        Self {
            event: "incoming_call",
            data: json!({
                "callId": call.id,
                "caller": call.initiated_id,
                "callee": call.recipient(),
            }),
        }
    }

    pub fn call_accepted(call: &Call, start_time: Timestamp) -> Self {
        Self {
            event: "call_accepted",
            data: json!({
                "callId": call.id,
                "calleeId": call.recipient(),
                "startTime": start_time.to_rfc3339(),
            }),
        }
    }

    pub fn call_declined(call_id: CallId) -> Self {
        Self::call_event("call_declined", call_id)
    }

    pub fn call_ended(call_id: CallId) -> Self {
        Self::call_event("call_ended", call_id)
    }

    pub fn call_missed(call_id: CallId) -> Self {
        Self::call_event("call_missed", call_id)
    }

    /// A WebRTC frame forwarded verbatim, tagged with its sender.
    pub fn relayed(kind: RelayKind, sender_id: &UserId, payload: Value) -> Self {
        Self {
            event: kind.event_name(),
            data: json!({ "senderId": sender_id, "payload": payload }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event: "error",
            data: json!({ "message": message.into() }),
        }
    }

    fn call_event(event: &'static str, call_id: CallId) -> Self {
        Self {
            event,
            data: json!({ "callId": call_id }),
        }
    }

    /// Serializes the envelope as a text frame.
    pub fn to_text(&self) -> String {
        // Serializing a &str and a Value cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
