//! HTTP adapters - REST endpoints, middleware and the application router.

pub mod calls;
pub mod middleware;
mod router;

pub use calls::{call_routes, CallHandlers};
pub use router::app_router;
