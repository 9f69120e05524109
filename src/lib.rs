//! Huddle - Real-time chat fanout and call signaling backend
//!
//! Chat messages published on any process reach every subscriber of the
//! conversation through a pub/sub broker, and are persisted off the hot path
//! by a bounded worker pool. One-to-one calls are coordinated by a state
//! machine whose transitions are compare-and-swap updates on the call store,
//! and WebRTC signals are relayed to every device of the target user.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
