//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `call` - Call record, status lifecycle and pair normalization
//! - `chat` - Live chat frames and queued messages
//! - `signaling` - Notifications pushed to users' signaling sockets

pub mod call;
pub mod chat;
pub mod foundation;
pub mod signaling;
