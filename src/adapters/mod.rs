//! Adapters - Implementations of port interfaces.
//!
//! - `auth` - JWT token validation
//! - `http` - REST endpoints, middleware and the application router
//! - `memory` - in-process storage for tests and local runs
//! - `postgres` - PostgreSQL storage
//! - `pubsub` - Redis and in-memory brokers
//! - `websocket` - chat, notification and room sockets

pub mod auth;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod pubsub;
pub mod websocket;
