//! Application router: REST endpoints, realtime sockets and shared layers.

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{realtime_router, RealtimeState};

use super::calls::{call_routes, CallHandlers};
use super::middleware::{auth_middleware, AuthState};

/// Assembles the full HTTP surface.
///
/// The request timeout covers the REST routes only; upgraded sockets are
/// long-lived and bounded by their own liveness checks.
pub fn app_router(
    realtime: RealtimeState,
    calls: CallHandlers,
    auth: AuthState,
    request_timeout: Duration,
) -> Router {
    let api = Router::new()
        .nest("/api/calls", call_routes(calls))
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .merge(realtime_router(realtime))
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}
