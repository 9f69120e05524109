//! HTTP adapter for call endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, StartCallRequest, StartCallResponse};
pub use handlers::CallHandlers;
pub use routes::call_routes;
