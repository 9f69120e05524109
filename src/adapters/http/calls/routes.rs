//! HTTP routes for call endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{get_call, start_call, CallHandlers};

/// Creates the call router, to be nested under `/api/calls`.
pub fn call_routes(handlers: CallHandlers) -> Router {
    Router::new()
        .route("/", post(start_call))
        .route("/:id", get(get_call))
        .with_state(handlers)
}
