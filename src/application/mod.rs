//! Application layer - Services coordinating the domain and its ports.
//!
//! - `CallStateMachine` - create-or-join and conditional call transitions
//! - `CallSignalingService` - call transitions plus targeted notifications
//! - `ChatIngestService` - turns chat frames into queued messages
//! - `MessageWriter` - bounded persistence worker pool

mod call_signaling;
mod call_state_machine;
mod chat_ingest;
mod message_writer;

pub use call_signaling::{CallSignalingService, SignalingError};
pub use call_state_machine::CallStateMachine;
pub use chat_ingest::{ChatIngestService, IngestError};
pub use message_writer::{EnqueueError, MessageWriter, WriterSettings};
