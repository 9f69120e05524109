//! Routes of the realtime sockets.

use axum::{routing::get, Router};

use super::chat_socket::chat_socket;
use super::notification_socket::notification_socket;
use super::room_socket::room_socket;
use super::state::RealtimeState;

/// Creates the router for the three socket endpoints.
pub fn realtime_router(state: RealtimeState) -> Router {
    Router::new()
        .route("/ws/chat", get(chat_socket))
        .route("/ws/notifications", get(notification_socket))
        .route("/ws/room", get(room_socket))
        .with_state(state)
}
