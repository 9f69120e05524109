//! Notification socket: `GET /ws/notifications?user_id=…`.
//!
//! Carries targeted call events to every device of a user and accepts the
//! signaling events that drive the call lifecycle. A frame that cannot be
//! decoded or acted on is answered with an `error` event on the same
//! connection only; the socket stays open.

use std::ops::ControlFlow;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;

use crate::adapters::http::middleware::OptionalAuth;
use crate::application::{CallSignalingService, SignalingError};
use crate::domain::foundation::UserId;
use crate::domain::signaling::Notification;

use super::connection::{connection, ConnectionHandle};
use super::protocol::SignalEvent;
use super::pump::{read_loop, write_loop};
use super::state::{RealtimeState, SIGNAL_MAX_FRAME};

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    user_id: Option<String>,
}

pub async fn notification_socket(
    State(state): State<RealtimeState>,
    OptionalAuth(authenticated): OptionalAuth,
    Query(params): Query<NotificationParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match state.resolve_identity(authenticated, params.user_id.as_deref()) {
        Ok(user_id) => user_id,
        Err(refusal) => return refusal.into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.max_message_size(SIGNAL_MAX_FRAME)
        .max_frame_size(SIGNAL_MAX_FRAME)
        .on_upgrade(move |socket| run_notifications(socket, state, user_id))
}

async fn run_notifications(socket: WebSocket, state: RealtimeState, user_id: UserId) {
    let (handle, queue) = connection(user_id.clone(), state.settings.send_queue_capacity);
    let reply = handle.clone();
    let connection_id = state.notifications.connect(handle).await;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "Notification socket connected");

    let (sink, stream) = socket.split();
    let liveness = state.settings.liveness;
    let mut writer = tokio::spawn(write_loop(sink, queue, liveness));

    let (signaling, user_ref, reply_ref) = (&state.signaling, &user_id, &reply);
    let reader = read_loop(stream, liveness, |text| async move {
        handle_frame(signaling, user_ref, reply_ref, &text).await;
        ControlFlow::Continue(())
    });

    tokio::select! {
        end = reader => tracing::debug!(connection_id = %connection_id, ?end, "Notification read loop ended"),
        end = &mut writer => tracing::debug!(connection_id = %connection_id, ?end, "Notification write loop ended"),
    }

    state.notifications.disconnect(&user_id, connection_id).await;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "Notification socket disconnected");
}

/// Decodes and dispatches one frame, answering failures on `reply`.
pub(crate) async fn handle_frame(
    signaling: &CallSignalingService,
    user_id: &UserId,
    reply: &ConnectionHandle,
    text: &str,
) {
    let outcome = match SignalEvent::decode(text) {
        Ok(event) => dispatch(signaling, user_id, event).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    if let Err(message) = outcome {
        tracing::debug!(user_id = %user_id, error = %message, "Signaling frame refused");
        if reply.try_send(Notification::error(message).to_text()).is_err() {
            tracing::debug!(user_id = %user_id, "Could not report signaling error");
        }
    }
}

async fn dispatch(signaling: &CallSignalingService, user_id: &UserId, event: SignalEvent) -> Result<(), SignalingError> {
    match event {
        SignalEvent::AcceptCall { call_id } => signaling.accept_call(user_id, call_id).await.map(|_| ()),
        SignalEvent::DeclineCall { call_id } => signaling.decline_call(user_id, call_id).await.map(|_| ()),
        SignalEvent::EndCall { call_id } => signaling.end_call(user_id, call_id).await.map(|_| ()),
        SignalEvent::Relay {
            kind,
            target_id,
            payload,
        } => signaling
            .relay_signal(user_id, kind, &target_id, payload)
            .await
            .map(|_| ()),
    }
}
