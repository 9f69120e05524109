//! WebSocket adapters for live chat and call signaling.
//!
//! # Architecture
//!
//! ```text
//!   chat socket ──► TopicRegistry ◄── FanoutBridge ◄──► PubSubBroker (Redis)
//!
//!   notification socket ──► NotificationMultiplexer ◄── CallSignalingService
//!
//!   room socket ──► RoomDirectory ──► Room (one control loop per room)
//! ```
//!
//! Every socket gets a [`connection`] record: a bounded outbound queue with
//! a close-once flag. The socket's [`pump`] loops own the socket itself;
//! registries only ever hold the producing side of the queue and never
//! wait on a slow consumer.
//!
//! # Components
//!
//! - [`connection`] - connection handle and outbound queue
//! - [`pump`] - read and write loops with ping/pong liveness
//! - [`hub`] - per-process topic registry
//! - [`fanout`] - broker subscription bridge
//! - [`notifications`] - per-user multi-device delivery
//! - [`rooms`] - ephemeral signaling rooms
//! - [`protocol`] - inbound signaling events

pub mod chat_socket;
pub mod connection;
pub mod fanout;
pub mod hub;
pub mod notification_socket;
pub mod notifications;
pub mod protocol;
pub mod pump;
pub mod room_socket;
pub mod rooms;
pub mod routes;
pub mod state;

pub use connection::{connection, ConnectionHandle, OutboundQueue, SendFailure};
pub use fanout::FanoutBridge;
pub use hub::{Exclude, TopicRegistry};
pub use notifications::NotificationMultiplexer;
pub use protocol::{ProtocolError, SignalEvent};
pub use pump::Liveness;
pub use rooms::{RoomDirectory, RoomEvent, RoomSession};
pub use routes::realtime_router;
pub use state::{RealtimeState, SocketSettings};
