//! Connection record shared between the socket loops and the registries.
//!
//! Every physical socket gets one bounded outbound queue. The registry that
//! owns the connection holds a [`ConnectionHandle`] (the producing side); the
//! socket's write loop drains the matching [`OutboundQueue`]. Producers never
//! wait on a full queue: `try_send` reports `Full` and the owner evicts the
//! slow consumer instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::domain::foundation::{ConnectionId, UserId};

/// Time allowed to write one frame to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed between liveness responses from the peer.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping period. Must be less than [`PONG_WAIT`].
pub const PING_PERIOD: Duration = Duration::from_secs(PONG_WAIT.as_secs() * 9 / 10);

/// Default capacity of a connection's outbound queue.
pub const SEND_QUEUE_CAPACITY: usize = 256;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The consumer is lagging; its queue is at capacity.
    Full,
    /// The connection has already been closed.
    Closed,
}

/// One-shot close flag that also wakes the write loop.
#[derive(Debug, Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

/// Producer side of a connection, held by exactly one registry.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    tx: mpsc::Sender<String>,
    close: Arc<CloseSignal>,
}

/// Consumer side of a connection, owned by the socket's write loop.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<String>,
    close: Arc<CloseSignal>,
}

/// Creates a connection record for `user_id` with a fresh connection id.
pub fn connection(user_id: UserId, capacity: usize) -> (ConnectionHandle, OutboundQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let close = Arc::new(CloseSignal::default());
    (
        ConnectionHandle {
            id: ConnectionId::new(),
            user_id,
            tx,
            close: close.clone(),
        },
        OutboundQueue { rx, close },
    )
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Queues a frame without waiting.
    pub fn try_send(&self, payload: String) -> Result<(), SendFailure> {
        if self.is_closed() {
            return Err(SendFailure::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    /// Closes the outbound queue.
    ///
    /// Returns true only for the call that actually closed it; later calls
    /// are no-ops.
    pub fn close(&self) -> bool {
        let first = !self.close.closed.swap(true, Ordering::AcqRel);
        if first {
            self.close.notify.notify_one();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.close.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

impl OutboundQueue {
    /// Next frame to write, or `None` once the connection is closed.
    ///
    /// Frames still buffered when the close arrives are discarded.
    pub async fn next(&mut self) -> Option<String> {
        if self.close.closed.load(Ordering::Acquire) {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.close.notify.notified() => None,
            frame = self.rx.recv() => frame,
        }
    }
}
