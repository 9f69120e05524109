//! Shared state of the realtime socket endpoints.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::application::{CallSignalingService, ChatIngestService};
use crate::domain::foundation::UserId;
use crate::ports::ConversationAccess;

use super::connection::SEND_QUEUE_CAPACITY;
use super::fanout::FanoutBridge;
use super::notifications::NotificationMultiplexer;
use super::pump::Liveness;
use super::rooms::RoomDirectory;

/// Largest inbound chat frame, in bytes.
pub const CHAT_MAX_FRAME: usize = 1024;

/// Largest inbound signaling frame, in bytes. SDP offers exceed 1 KiB.
pub const SIGNAL_MAX_FRAME: usize = 64 * 1024;

/// Per-socket tuning.
#[derive(Debug, Clone, Copy)]
pub struct SocketSettings {
    pub send_queue_capacity: usize,
    pub liveness: Liveness,
    /// Accept a `user_id` query parameter as identity when no token is sent.
    pub trust_query_identity: bool,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: SEND_QUEUE_CAPACITY,
            liveness: Liveness::default(),
            trust_query_identity: false,
        }
    }
}

#[derive(Clone)]
pub struct RealtimeState {
    pub fanout: FanoutBridge,
    pub chat: ChatIngestService,
    pub conversations: Arc<dyn ConversationAccess>,
    pub notifications: Arc<NotificationMultiplexer>,
    pub signaling: CallSignalingService,
    pub rooms: RoomDirectory,
    pub settings: SocketSettings,
}

impl RealtimeState {
    /// Decides who is on the other end of a signaling socket.
    ///
    /// A token identity always wins; a `user_id` query parameter must agree
    /// with it. Without a token the query parameter is only honoured when
    /// `trust_query_identity` is set.
    pub fn resolve_identity(
        &self,
        authenticated: Option<UserId>,
        claimed: Option<&str>,
    ) -> Result<UserId, (StatusCode, &'static str)> {
        let claimed = match claimed.filter(|c| !c.is_empty()) {
            Some(raw) => Some(UserId::new(raw).map_err(|_| (StatusCode::BAD_REQUEST, "Invalid user_id"))?),
            None => None,
        };

        match (authenticated, claimed) {
            (Some(user), Some(claimed)) if user != claimed => {
                Err((StatusCode::FORBIDDEN, "user_id does not match the token"))
            }
            (Some(user), _) => Ok(user),
            (None, Some(claimed)) if self.settings.trust_query_identity => Ok(claimed),
            (None, Some(_)) => Err((StatusCode::UNAUTHORIZED, "Authentication required")),
            (None, None) => Err((StatusCode::BAD_REQUEST, "Missing user_id")),
        }
    }
}
