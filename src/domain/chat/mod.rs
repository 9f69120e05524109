//! Chat module - live chat messages on their way to storage and fanout.

mod message;

pub use message::{ChatFrame, MessageType, QueuedMessage};
