//! HTTP handlers for call endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::middleware::RequireAuth;
use crate::application::{CallSignalingService, SignalingError};
use crate::domain::call::CallError;
use crate::domain::foundation::{CallId, UserId};

use super::dto::{ErrorResponse, StartCallRequest, StartCallResponse};

#[derive(Clone)]
pub struct CallHandlers {
    signaling: CallSignalingService,
}

impl CallHandlers {
    pub fn new(signaling: CallSignalingService) -> Self {
        Self { signaling }
    }
}

/// POST /api/calls - Place a call, or join the open one between the pair
pub async fn start_call(
    State(handlers): State<CallHandlers>,
    RequireAuth(user): RequireAuth,
    Json(req): Json<StartCallRequest>,
) -> Response {
    if let Some(caller) = req.caller_id.as_deref() {
        if caller != user.as_str() {
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::forbidden("caller_id must be the authenticated user")),
            )
                .into_response();
        }
    }

    let callee = match UserId::new(req.callee_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request("Invalid callee_id")),
            )
                .into_response()
        }
    };

    match handlers.signaling.start_call(user, callee).await {
        Ok((call, role)) => (StatusCode::OK, Json(StartCallResponse { call, role })).into_response(),
        Err(e) => handle_signaling_error(e),
    }
}

/// GET /api/calls/:id - Fetch a call the user is party to
pub async fn get_call(
    State(handlers): State<CallHandlers>,
    RequireAuth(user): RequireAuth,
    Path(call_id): Path<String>,
) -> Response {
    let call_id = match call_id.parse::<CallId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request("Invalid call ID")),
            )
                .into_response()
        }
    };

    match handlers.signaling.calls().get_by_id(call_id).await {
        Ok(call) if call.is_party(&user) => (StatusCode::OK, Json(call)).into_response(),
        Ok(_) => handle_call_error(CallError::Forbidden { call_id, user_id: user }),
        Err(e) => handle_call_error(e),
    }
}

fn handle_signaling_error(error: SignalingError) -> Response {
    match error {
        SignalingError::Call(e) => handle_call_error(e),
        SignalingError::Delivery(e) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("NOT_CONNECTED", e.to_string())),
        )
            .into_response(),
        SignalingError::CalleeOffline(_) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("CALLEE_OFFLINE", error.to_string())),
        )
            .into_response(),
    }
}

fn handle_call_error(error: CallError) -> Response {
    match error {
        CallError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found("Call", &id.to_string())),
        )
            .into_response(),
        CallError::Forbidden { .. } => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::forbidden(error.to_string())),
        )
            .into_response(),
        CallError::PermissionDenied => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request(error.to_string())),
        )
            .into_response(),
        CallError::InvalidTransition { .. } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::conflict(error.to_string())),
        )
            .into_response(),
        CallError::Storage(msg) => {
            tracing::error!(error = %msg, "Call storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal("Call storage failed")),
            )
                .into_response()
        }
    }
}
