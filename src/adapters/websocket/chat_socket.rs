//! Chat socket: `GET /ws/chat?conversation_id=…`.
//!
//! Participation is checked before the upgrade. Once connected, every
//! accepted frame is stamped, queued for persistence and published to the
//! conversation topic; the connection receives the topic's traffic through
//! the fanout bridge, minus its own user's messages.

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

use crate::adapters::http::middleware::RequireAuth;
use crate::domain::foundation::{ConversationId, UserId};

use super::connection::connection;
use super::pump::{read_loop, write_loop};
use super::state::{RealtimeState, CHAT_MAX_FRAME};

#[derive(Debug, Deserialize)]
pub struct ChatParams {
    conversation_id: String,
}

pub async fn chat_socket(
    State(state): State<RealtimeState>,
    RequireAuth(user_id): RequireAuth,
    Query(params): Query<ChatParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let conversation_id = match ConversationId::new(params.conversation_id) {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.conversations.is_participant(&user_id, &conversation_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(user_id = %user_id, conversation_id = %conversation_id, "Chat socket refused");
            return (StatusCode::FORBIDDEN, "Not a participant of this conversation").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Participation check failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Participation check failed").into_response();
        }
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.max_message_size(CHAT_MAX_FRAME)
        .max_frame_size(CHAT_MAX_FRAME)
        .on_upgrade(move |socket| run_chat(socket, state, user_id, conversation_id))
}

async fn run_chat(socket: WebSocket, state: RealtimeState, user_id: UserId, conversation_id: ConversationId) {
    let (handle, queue) = connection(user_id.clone(), state.settings.send_queue_capacity);
    let connection_id = handle.id();
    let topic = conversation_id.topic();
    let registry = state.fanout.registry().clone();

    registry.register(handle).await;
    registry.subscribe(connection_id, topic.clone()).await;
    if let Err(e) = state.fanout.subscribe_topic(&topic).await {
        tracing::error!(topic = %topic, error = %e, "No broker subscription; this socket only sends");
    }
    tracing::info!(user_id = %user_id, connection_id = %connection_id, topic = %topic, "Chat socket connected");

    let (sink, stream) = socket.split();
    let liveness = state.settings.liveness;
    let mut writer = tokio::spawn(write_loop(sink, queue, liveness));

    let (state_ref, user_ref, conversation_ref, topic_ref) = (&state, &user_id, &conversation_id, &topic);
    let reader = read_loop(stream, liveness, |text| async move {
        relay_chat_frame(state_ref, conversation_ref, user_ref, topic_ref, &text).await;
        ControlFlow::Continue(())
    });

    tokio::select! {
        end = reader => tracing::debug!(connection_id = %connection_id, ?end, "Chat read loop ended"),
        end = &mut writer => tracing::debug!(connection_id = %connection_id, ?end, "Chat write loop ended"),
    }

    registry.unregister(connection_id).await;
    tracing::info!(user_id = %user_id, connection_id = %connection_id, "Chat socket disconnected");
}

async fn relay_chat_frame(
    state: &RealtimeState,
    conversation_id: &ConversationId,
    user_id: &UserId,
    topic: &str,
    text: &str,
) {
    let message = match state.chat.ingest(conversation_id, user_id, text).await {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "Dropping chat frame");
            return;
        }
    };

    let payload = match serde_json::to_string(&message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(message_id = %message.id, error = %e, "Failed to encode chat message");
            return;
        }
    };

    if let Err(e) = state.fanout.publish(topic, payload).await {
        tracing::warn!(message_id = %message.id, topic = %topic, error = %e, "Publish failed");
    }
}
