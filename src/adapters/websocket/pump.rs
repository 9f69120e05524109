//! Per-connection read and write loops.
//!
//! Each socket runs two concurrent loops that only talk through the
//! connection's outbound queue:
//!
//! - the write loop drains the queue in FIFO order and pings on an idle
//!   timer, giving every write [`Liveness::write_wait`] to complete;
//! - the read loop hands text frames to a callback and enforces a read
//!   deadline that is pushed forward whenever a ping or pong arrives.
//!
//! Either loop ending is the connection's only cancellation signal; the
//! socket handler then runs cleanup.

use std::fmt::Display;
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, timeout, timeout_at, Instant};

use super::connection::{OutboundQueue, PING_PERIOD, PONG_WAIT, WRITE_WAIT};

/// Liveness timing for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            ping_period: PING_PERIOD,
            pong_wait: PONG_WAIT,
            write_wait: WRITE_WAIT,
        }
    }
}

/// Why a read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEnd {
    /// Peer sent a close frame or the stream ended.
    Closed,
    /// No liveness response within the read deadline.
    DeadlineExpired,
    /// Transport error.
    Error(String),
    /// The frame callback asked to stop.
    Stopped,
}

/// Why a write loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEnd {
    /// The outbound queue was closed by its owner.
    QueueClosed,
    /// A write or ping failed or timed out.
    Failed(String),
}

/// Drains `queue` into `sink` until the queue closes or a write fails.
pub async fn write_loop<S>(mut sink: S, mut queue: OutboundQueue, liveness: Liveness) -> WriteEnd
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = interval_at(Instant::now() + liveness.ping_period, liveness.ping_period);

    loop {
        tokio::select! {
            frame = queue.next() => match frame {
                Some(text) => {
                    if let Err(reason) = send_with_deadline(&mut sink, Message::Text(text), liveness.write_wait).await {
                        return WriteEnd::Failed(reason);
                    }
                }
                None => {
                    let _ = send_with_deadline(&mut sink, Message::Close(None), liveness.write_wait).await;
                    return WriteEnd::QueueClosed;
                }
            },
            _ = ticker.tick() => {
                if let Err(reason) = send_with_deadline(&mut sink, Message::Ping(Vec::new()), liveness.write_wait).await {
                    return WriteEnd::Failed(reason);
                }
            }
        }
    }
}

async fn send_with_deadline<S>(sink: &mut S, message: Message, wait: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write timed out".to_string()),
    }
}

/// Reads frames until the peer goes away, the deadline expires, or
/// `on_text` returns `ControlFlow::Break`.
///
/// Binary frames are ignored; text frames are passed to `on_text` in
/// arrival order, one at a time.
pub async fn read_loop<St, E, F, Fut>(mut stream: St, liveness: Liveness, mut on_text: F) -> ReadEnd
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ControlFlow<()>>,
{
    let mut deadline = Instant::now() + liveness.pong_wait;

    loop {
        let next = match timeout_at(deadline, stream.next()).await {
            Ok(next) => next,
            Err(_) => return ReadEnd::DeadlineExpired,
        };

        match next {
            None => return ReadEnd::Closed,
            Some(Err(e)) => return ReadEnd::Error(e.to_string()),
            Some(Ok(message)) => match message {
                Message::Text(text) => {
                    if on_text(text).await.is_break() {
                        return ReadEnd::Stopped;
                    }
                }
                Message::Pong(_) | Message::Ping(_) => {
                    deadline = Instant::now() + liveness.pong_wait;
                }
                Message::Binary(_) => {
                    tracing::debug!("Ignoring unsupported binary frame");
                }
                Message::Close(_) => return ReadEnd::Closed,
            },
        }
    }
}
