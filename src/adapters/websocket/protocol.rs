//! Inbound wire format of the notification socket.
//!
//! Clients send a `{ "event": ..., "data": ... }` envelope. It is decoded
//! once into a [`SignalEvent`] so the socket handler dispatches from a
//! single `match`. Outbound envelopes are built by
//! [`Notification`](crate::domain::signaling::Notification).

use serde::Deserialize;
use serde_json::Value;

use crate::domain::foundation::{CallId, UserId};
use crate::domain::signaling::RelayKind;

/// A decoded client event from the notification socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent {
    AcceptCall { call_id: CallId },
    DeclineCall { call_id: CallId },
    EndCall { call_id: CallId },
    Relay {
        kind: RelayKind,
        target_id: UserId,
        payload: Value,
    },
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Invalid data for '{event}': {reason}")]
    InvalidData { event: String, reason: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallRef {
    call_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayData {
    target_id: String,
    #[serde(default)]
    payload: Value,
}

impl SignalEvent {
    /// Decodes one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let event = envelope.event.as_str();

        match event {
            "accept_call" => Ok(SignalEvent::AcceptCall {
                call_id: call_id(event, envelope.data)?,
            }),
            "decline_call" => Ok(SignalEvent::DeclineCall {
                call_id: call_id(event, envelope.data)?,
            }),
            "end_call" => Ok(SignalEvent::EndCall {
                call_id: call_id(event, envelope.data)?,
            }),
            "webrtc_offer" => relay(RelayKind::Offer, envelope.data),
            "webrtc_answer" => relay(RelayKind::Answer, envelope.data),
            "ice_candidate" => relay(RelayKind::IceCandidate, envelope.data),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn invalid(event: &str, reason: impl ToString) -> ProtocolError {
    ProtocolError::InvalidData {
        event: event.to_string(),
        reason: reason.to_string(),
    }
}

fn call_id(event: &str, data: Value) -> Result<CallId, ProtocolError> {
    let data: CallRef = serde_json::from_value(data).map_err(|e| invalid(event, e))?;
    data.call_id.parse().map_err(|e| invalid(event, e))
}

fn relay(kind: RelayKind, data: Value) -> Result<SignalEvent, ProtocolError> {
    let event = kind.event_name();
    let data: RelayData = serde_json::from_value(data).map_err(|e| invalid(event, e))?;
    let target_id = UserId::new(data.target_id).map_err(|e| invalid(event, e))?;
    Ok(SignalEvent::Relay {
        kind,
        target_id,
        payload: data.payload,
    })
}
