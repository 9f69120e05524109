//! HTTP middleware for axum.
//!
//! - `auth` - Bearer token middleware and identity extractors

pub mod auth;

pub use auth::{auth_middleware, AuthRejection, AuthState, OptionalAuth, RequireAuth};
