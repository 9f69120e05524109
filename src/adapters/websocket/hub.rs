//! Topic registry: the per-process hub for chat connections.
//!
//! All membership state lives inside one control task. Callers talk to it
//! through a cloneable [`TopicRegistry`] handle that sends commands over a
//! channel, so no lock is ever held across a socket write.
//!
//! # Architecture
//!
//! ```text
//! chat socket ─┐                         ┌─► conn a (queue)
//! chat socket ─┼─► Command ─► hub loop ──┼─► conn b (queue)
//! fanout task ─┘                         └─► conn c (queue)
//! ```
//!
//! A connection whose queue is full when a broadcast arrives is evicted:
//! it is removed from every topic and its queue is closed, which ends the
//! socket's write loop.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};

use crate::domain::foundation::{ConnectionId, UserId};

use super::connection::ConnectionHandle;

/// Which connections a broadcast skips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclude {
    Nobody,
    Connection(ConnectionId),
    User(UserId),
}

impl Exclude {
    fn skips(&self, handle: &ConnectionHandle) -> bool {
        match self {
            Exclude::Nobody => false,
            Exclude::Connection(id) => handle.id() == *id,
            Exclude::User(user) => handle.user_id() == user,
        }
    }
}

enum Command {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Subscribe {
        conn: ConnectionId,
        topic: String,
    },
    Unsubscribe {
        conn: ConnectionId,
        topic: String,
    },
    Broadcast {
        topic: String,
        payload: String,
        exclude: Exclude,
    },
    Snapshot(oneshot::Sender<HashMap<String, usize>>),
}

/// Handle to a running topic registry.
#[derive(Clone)]
pub struct TopicRegistry {
    tx: mpsc::Sender<Command>,
}

impl TopicRegistry {
    /// Starts the control loop and returns a handle to it.
    ///
    /// The loop stops once every handle has been dropped.
    pub fn spawn(command_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(command_capacity.max(1));
        tokio::spawn(run(rx));
        Self { tx }
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        self.send(Command::Register(handle)).await;
    }

    /// Removes the connection from every topic and closes its queue.
    pub async fn unregister(&self, conn: ConnectionId) {
        self.send(Command::Unregister(conn)).await;
    }

    pub async fn subscribe(&self, conn: ConnectionId, topic: impl Into<String>) {
        self.send(Command::Subscribe {
            conn,
            topic: topic.into(),
        })
        .await;
    }

    pub async fn unsubscribe(&self, conn: ConnectionId, topic: impl Into<String>) {
        self.send(Command::Unsubscribe {
            conn,
            topic: topic.into(),
        })
        .await;
    }

    /// Delivers `payload` to the local subscribers of `topic`.
    pub async fn broadcast_local(&self, topic: impl Into<String>, payload: String, exclude: Exclude) {
        self.send(Command::Broadcast {
            topic: topic.into(),
            payload,
            exclude,
        })
        .await;
    }

    /// Current topics and their member counts.
    pub async fn snapshot(&self) -> HashMap<String, usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await;
        rx.await.unwrap_or_default()
    }

    async fn send(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            tracing::warn!("Topic registry loop has stopped; command dropped");
        }
    }
}

#[derive(Default)]
struct HubState {
    clients: HashMap<ConnectionId, Client>,
    topics: HashMap<String, HashSet<ConnectionId>>,
}

struct Client {
    handle: ConnectionHandle,
    topics: HashSet<String>,
}

impl HubState {
    fn register(&mut self, handle: ConnectionHandle) {
        let id = handle.id();
        tracing::debug!(connection_id = %id, user_id = %handle.user_id(), "Connection registered");
        self.clients.insert(
            id,
            Client {
                handle,
                topics: HashSet::new(),
            },
        );
    }

    fn unregister(&mut self, id: ConnectionId) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        for topic in &client.topics {
            self.leave_topic(id, topic);
        }
        client.handle.close();
        tracing::debug!(connection_id = %id, "Connection unregistered");
    }

    fn subscribe(&mut self, id: ConnectionId, topic: String) {
        let Some(client) = self.clients.get_mut(&id) else {
            tracing::debug!(connection_id = %id, topic = %topic, "Subscribe for unknown connection ignored");
            return;
        };
        client.topics.insert(topic.clone());
        self.topics.entry(topic).or_default().insert(id);
    }

    fn unsubscribe(&mut self, id: ConnectionId, topic: &str) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.topics.remove(topic);
        }
        self.leave_topic(id, topic);
    }

    fn leave_topic(&mut self, id: ConnectionId, topic: &str) {
        if let Some(members) = self.topics.get_mut(topic) {
            members.remove(&id);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    fn broadcast(&mut self, topic: &str, payload: &str, exclude: &Exclude) {
        let Some(members) = self.topics.get(topic) else {
            return;
        };

        let mut evicted = Vec::new();
        for id in members {
            let Some(client) = self.clients.get(id) else {
                continue;
            };
            if exclude.skips(&client.handle) {
                continue;
            }
            if let Err(failure) = client.handle.try_send(payload.to_owned()) {
                tracing::warn!(
                    connection_id = %id,
                    topic = %topic,
                    reason = ?failure,
                    "Evicting connection that cannot keep up"
                );
                evicted.push(*id);
            }
        }

        for id in evicted {
            self.unregister(id);
        }
    }

    fn snapshot(&self) -> HashMap<String, usize> {
        self.topics
            .iter()
            .map(|(topic, members)| (topic.clone(), members.len()))
            .collect()
    }
}

async fn run(mut rx: mpsc::Receiver<Command>) {
    let mut state = HubState::default();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Register(handle) => state.register(handle),
            Command::Unregister(id) => state.unregister(id),
            Command::Subscribe { conn, topic } => state.subscribe(conn, topic),
            Command::Unsubscribe { conn, topic } => state.unsubscribe(conn, &topic),
            Command::Broadcast {
                topic,
                payload,
                exclude,
            } => state.broadcast(&topic, &payload, &exclude),
            Command::Snapshot(reply) => {
                let _ = reply.send(state.snapshot());
            }
        }
    }

    for (_, client) in state.clients.drain() {
        client.handle.close();
    }
    tracing::debug!("Topic registry loop stopped");
}
