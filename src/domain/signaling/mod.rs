//! Signaling notifications sent to users' notification sockets.

mod notification;

pub use notification::{Notification, RelayKind};
