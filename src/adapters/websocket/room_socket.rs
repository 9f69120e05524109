//! Room socket: `GET /ws/room?room_id=…&user_id=…` or `?call_id=…`.
//!
//! Frames are relayed raw to the other participants. A `{"type":"leave"}`
//! frame is relayed like any other and then ends the session. Call rooms
//! only admit the call's two parties, and a `room_id` can never name one.

use std::ops::ControlFlow;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;

use crate::adapters::http::middleware::OptionalAuth;
use crate::domain::call::CallError;
use crate::domain::foundation::{CallId, RoomId, UserId};

use super::connection::connection;
use super::pump::{read_loop, write_loop};
use super::state::{RealtimeState, SIGNAL_MAX_FRAME};

#[derive(Debug, Deserialize)]
pub struct RoomParams {
    pub(super) room_id: Option<String>,
    pub(super) call_id: Option<String>,
    pub(super) user_id: Option<String>,
}

pub async fn room_socket(
    State(state): State<RealtimeState>,
    OptionalAuth(authenticated): OptionalAuth,
    Query(params): Query<RoomParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match state.resolve_identity(authenticated, params.user_id.as_deref()) {
        Ok(user_id) => user_id,
        Err(refusal) => return refusal.into_response(),
    };

    let room_id = match room_for(&state, &user_id, &params).await {
        Ok(room_id) => room_id,
        Err(refusal) => return refusal.into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.max_message_size(SIGNAL_MAX_FRAME)
        .max_frame_size(SIGNAL_MAX_FRAME)
        .on_upgrade(move |socket| run_room(socket, state, user_id, room_id))
}

pub(super) async fn room_for(
    state: &RealtimeState,
    user_id: &UserId,
    params: &RoomParams,
) -> Result<RoomId, (StatusCode, String)> {
    if let Some(raw) = params.call_id.as_deref() {
        let call_id: CallId = raw
            .parse()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid call_id".to_string()))?;
        return match state.signaling.calls().get_by_id(call_id).await {
            Ok(call) if call.is_party(user_id) => Ok(RoomId::for_call(call_id)),
            Ok(_) => Err((StatusCode::FORBIDDEN, "Not a party to this call".to_string())),
            Err(CallError::NotFound(_)) => Err((StatusCode::NOT_FOUND, "Call not found".to_string())),
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "Call lookup failed");
                Err((StatusCode::INTERNAL_SERVER_ERROR, "Call lookup failed".to_string()))
            }
        };
    }

    match params.room_id.as_deref() {
        None | Some("") => Err((StatusCode::BAD_REQUEST, "Missing room_id or call_id".to_string())),
        Some(raw) => RoomId::new(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string())),
    }
}

async fn run_room(socket: WebSocket, state: RealtimeState, user_id: UserId, room_id: RoomId) {
    let (handle, queue) = connection(user_id.clone(), state.settings.send_queue_capacity);
    let session = state.rooms.join(room_id, handle).await;

    let (sink, stream) = socket.split();
    let liveness = state.settings.liveness;
    let mut writer = tokio::spawn(write_loop(sink, queue, liveness));

    let session_ref = &session;
    let reader = read_loop(stream, liveness, |text| async move {
        let leaving = is_leave(&text);
        session_ref.broadcast(text).await;
        if leaving {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    tokio::select! {
        end = reader => tracing::debug!(room_id = %session.room_id(), user_id = %user_id, ?end, "Room read loop ended"),
        end = &mut writer => tracing::debug!(room_id = %session.room_id(), user_id = %user_id, ?end, "Room write loop ended"),
    }

    session.leave().await;
}

#[derive(Deserialize)]
struct Control {
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn is_leave(text: &str) -> bool {
    serde_json::from_str::<Control>(text)
        .ok()
        .and_then(|control| control.kind)
        .is_some_and(|kind| kind == "leave")
}
