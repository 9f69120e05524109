//! Ephemeral signaling rooms.
//!
//! A room is a small group (typically the two parties of a call) whose
//! members exchange raw frames. Each room runs one control loop that owns
//! the participant set; joins, leaves and broadcasts reach it through a
//! single command channel, so they are applied in the order they were sent.
//!
//! # Lifecycle
//!
//! ```text
//! first join ─► room spawned + registered in RoomDirectory
//! last leave ─► room removes itself from the directory and stops
//! next join  ─► a fresh room is spawned under the same id
//! ```
//!
//! Joins are sent while the directory lock is held, and an emptied room
//! only unregisters itself while holding that same lock after checking its
//! channel is drained. A join therefore never lands in a room that is
//! shutting down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::domain::foundation::{ConnectionId, RoomId, UserId};

use super::connection::ConnectionHandle;

/// Control messages sent by the room to its participants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    #[serde(rename_all = "camelCase")]
    Welcome {
        room_id: RoomId,
        participants: Vec<UserId>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantJoined { room_id: RoomId, user_id: UserId },
    #[serde(rename_all = "camelCase")]
    ParticipantLeft { room_id: RoomId, user_id: UserId },
}

impl RoomEvent {
    fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

enum RoomCommand {
    Join(ConnectionHandle),
    Leave {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    Broadcast {
        from: UserId,
        payload: String,
    },
}

struct RoomEntry {
    generation: u64,
    tx: mpsc::Sender<RoomCommand>,
}

struct DirectoryInner {
    rooms: Mutex<HashMap<RoomId, RoomEntry>>,
    next_generation: AtomicU64,
    queue_capacity: usize,
}

/// Registry of live rooms, keyed by room id.
#[derive(Clone)]
pub struct RoomDirectory {
    inner: Arc<DirectoryInner>,
}

impl RoomDirectory {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(DirectoryInner {
                rooms: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
            }),
        }
    }

    /// Adds a connection to a room, creating the room if needed.
    pub async fn join(&self, room_id: RoomId, handle: ConnectionHandle) -> RoomSession {
        let session = RoomSession {
            room_id: room_id.clone(),
            user_id: handle.user_id().clone(),
            connection_id: handle.id(),
            tx: self.send_join(room_id, handle).await,
        };
        tracing::debug!(
            room_id = %session.room_id,
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            "Joined room"
        );
        session
    }

    async fn send_join(&self, room_id: RoomId, handle: ConnectionHandle) -> mpsc::Sender<RoomCommand> {
        let mut rooms = self.inner.rooms.lock().await;

        if let Some(entry) = rooms.get(&room_id) {
            if let Ok(permit) = entry.tx.reserve().await {
                permit.send(RoomCommand::Join(handle));
                return entry.tx.clone();
            }
            tracing::warn!(room_id = %room_id, "Room loop gone without unregistering; replacing it");
        }

        self.spawn_room(&mut rooms, room_id, handle).await
    }

    async fn spawn_room(
        &self,
        rooms: &mut HashMap<RoomId, RoomEntry>,
        room_id: RoomId,
        first: ConnectionHandle,
    ) -> mpsc::Sender<RoomCommand> {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.queue_capacity);

        let _ = tx.send(RoomCommand::Join(first)).await;
        rooms.insert(
            room_id.clone(),
            RoomEntry {
                generation,
                tx: tx.clone(),
            },
        );

        tracing::info!(room_id = %room_id, generation, "Room created");
        tokio::spawn(
            Room {
                room_id,
                generation,
                participants: HashMap::new(),
                directory: self.clone(),
            }
            .run(rx),
        );
        tx
    }

    /// Unregisters a room if the registered instance is `generation`.
    ///
    /// Idempotent; a stale generation never removes a newer room.
    async fn remove(&self, room_id: &RoomId, generation: u64) -> bool {
        let mut rooms = self.inner.rooms.lock().await;
        remove_locked(&mut rooms, room_id, generation)
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.inner.rooms.lock().await.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.inner.rooms.lock().await.len()
    }
}

fn remove_locked(rooms: &mut HashMap<RoomId, RoomEntry>, room_id: &RoomId, generation: u64) -> bool {
    match rooms.get(room_id) {
        Some(entry) if entry.generation == generation => {
            rooms.remove(room_id);
            true
        }
        _ => false,
    }
}

/// One participant's membership in a room.
pub struct RoomSession {
    room_id: RoomId,
    user_id: UserId,
    connection_id: ConnectionId,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomSession {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Sends a raw frame to every other participant.
    pub async fn broadcast(&self, payload: String) {
        let command = RoomCommand::Broadcast {
            from: self.user_id.clone(),
            payload,
        };
        if self.tx.send(command).await.is_err() {
            tracing::debug!(room_id = %self.room_id, "Broadcast to a closed room dropped");
        }
    }

    /// Leaves the room. Has no effect if this connection was already
    /// replaced or evicted.
    pub async fn leave(self) {
        let command = RoomCommand::Leave {
            user_id: self.user_id.clone(),
            connection_id: self.connection_id,
        };
        let _ = self.tx.send(command).await;
    }
}

struct Room {
    room_id: RoomId,
    generation: u64,
    participants: HashMap<UserId, ConnectionHandle>,
    directory: RoomDirectory,
}

impl Room {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        loop {
            if self.participants.is_empty() {
                if self.try_shutdown(&mut rx).await {
                    break;
                }
                continue;
            }

            match rx.recv().await {
                Some(command) => self.apply(command),
                None => break,
            }
        }

        for (_, handle) in self.participants.drain() {
            handle.close();
        }
        tracing::info!(room_id = %self.room_id, generation = self.generation, "Room destroyed");
    }

    /// Waits for either a command or the directory lock. Returns true once
    /// the room has unregistered itself.
    async fn try_shutdown(&mut self, rx: &mut mpsc::Receiver<RoomCommand>) -> bool {
        let directory = self.directory.clone();
        tokio::select! {
            biased;
            command = rx.recv() => match command {
                Some(command) => {
                    self.apply(command);
                    false
                }
                None => {
                    directory.remove(&self.room_id, self.generation).await;
                    true
                }
            },
            mut rooms = directory.inner.rooms.lock() => match rx.try_recv() {
                Ok(command) => {
                    drop(rooms);
                    self.apply(command);
                    false
                }
                Err(_) => {
                    remove_locked(&mut rooms, &self.room_id, self.generation);
                    true
                }
            },
        }
    }

    fn apply(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join(handle) => self.join(handle),
            RoomCommand::Leave {
                user_id,
                connection_id,
            } => self.leave(&user_id, connection_id),
            RoomCommand::Broadcast { from, payload } => self.broadcast(&from, &payload),
        }
    }

    fn join(&mut self, handle: ConnectionHandle) {
        let user_id = handle.user_id().clone();

        let mut others: Vec<UserId> = self
            .participants
            .keys()
            .filter(|id| **id != user_id)
            .cloned()
            .collect();
        others.sort();

        let welcome = RoomEvent::Welcome {
            room_id: self.room_id.clone(),
            participants: others,
        };
        let _ = handle.try_send(welcome.to_text());

        let rejoined = match self.participants.insert(user_id.clone(), handle) {
            Some(previous) => {
                previous.close();
                true
            }
            None => false,
        };

        if !rejoined {
            let joined = RoomEvent::ParticipantJoined {
                room_id: self.room_id.clone(),
                user_id: user_id.clone(),
            };
            self.deliver(Some(&user_id), &joined.to_text());
        }
    }

    fn leave(&mut self, user_id: &UserId, connection_id: ConnectionId) {
        let current = match self.participants.get(user_id) {
            Some(handle) if handle.id() == connection_id => handle,
            _ => return,
        };
        current.close();
        self.participants.remove(user_id);
        self.announce_left(user_id.clone());
    }

    fn broadcast(&mut self, from: &UserId, payload: &str) {
        self.deliver(Some(from), payload);
    }

    fn announce_left(&mut self, user_id: UserId) {
        tracing::debug!(room_id = %self.room_id, user_id = %user_id, "Participant left");
        let left = RoomEvent::ParticipantLeft {
            room_id: self.room_id.clone(),
            user_id,
        };
        self.deliver(None, &left.to_text());
    }

    /// Sends to every participant except `skip`, evicting any that cannot
    /// accept the frame.
    fn deliver(&mut self, skip: Option<&UserId>, payload: &str) {
        let mut evicted = Vec::new();
        for (user_id, handle) in &self.participants {
            if Some(user_id) == skip {
                continue;
            }
            if handle.try_send(payload.to_owned()).is_err() {
                evicted.push(user_id.clone());
            }
        }

        for user_id in evicted {
            if let Some(handle) = self.participants.remove(&user_id) {
                tracing::warn!(room_id = %self.room_id, user_id = %user_id, "Evicting room participant that cannot keep up");
                handle.close();
                self.announce_left(user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::connection::{connection, OutboundQueue};
    use serde_json::Value;
    use std::time::Duration;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    async fn recv(queue: &mut OutboundQueue) -> Option<String> {
        tokio::time::timeout(Duration::from_millis(200), queue.next())
            .await
            .ok()
            .flatten()
    }

    async fn recv_json(queue: &mut OutboundQueue) -> Value {
        serde_json::from_str(&recv(queue).await.expect("expected a frame")).unwrap()
    }

    async fn wait_until_gone(directory: &RoomDirectory, id: &RoomId) {
        for _ in 0..100 {
            if !directory.contains(id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room {id} was not destroyed");
    }

    #[tokio::test]
    async fn join_sends_welcome_and_announces_to_others() {
        let directory = RoomDirectory::new(16);
        let (alice, mut qa) = connection(user("alice"), 8);
        let (bob, mut qb) = connection(user("bob"), 8);

        let _sa = directory.join(room("r1"), alice).await;
        let welcome = recv_json(&mut qa).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["roomId"], "r1");
        assert_eq!(welcome["participants"], serde_json::json!([]));

        let _sb = directory.join(room("r1"), bob).await;
        let welcome = recv_json(&mut qb).await;
        assert_eq!(welcome["participants"], serde_json::json!(["alice"]));

        let joined = recv_json(&mut qa).await;
        assert_eq!(joined["type"], "participant_joined");
        assert_eq!(joined["userId"], "bob");
    }

    #[tokio::test]
    async fn broadcast_excludes_the_sender() {
        let directory = RoomDirectory::new(16);
        let (alice, mut qa) = connection(user("alice"), 8);
        let (bob, mut qb) = connection(user("bob"), 8);
        let sa = directory.join(room("r"), alice).await;
        let _sb = directory.join(room("r"), bob).await;
        recv(&mut qa).await; // welcome
        recv(&mut qa).await; // bob joined
        recv(&mut qb).await; // welcome

        sa.broadcast(r#"{"type":"offer","sdp":"v=0"}"#.into()).await;

        assert_eq!(recv(&mut qb).await.as_deref(), Some(r#"{"type":"offer","sdp":"v=0"}"#));
        assert_eq!(recv(&mut qa).await, None);
    }

    #[tokio::test]
    async fn last_leave_destroys_room_and_next_join_recreates_it() {
        let directory = RoomDirectory::new(16);
        let (alice, mut qa) = connection(user("alice"), 8);
        let (bob, mut qb) = connection(user("bob"), 8);
        let sa = directory.join(room("r"), alice.clone()).await;
        let sb = directory.join(room("r"), bob).await;
        recv(&mut qa).await;
        recv(&mut qa).await;
        recv(&mut qb).await;

        sa.leave().await;
        let left = recv_json(&mut qb).await;
        assert_eq!(left["type"], "participant_left");
        assert_eq!(left["userId"], "alice");
        assert!(alice.is_closed());
        assert!(directory.contains(&room("r")).await);

        sb.leave().await;
        wait_until_gone(&directory, &room("r")).await;
        assert_eq!(directory.room_count().await, 0);

        let (carol, mut qc) = connection(user("carol"), 8);
        let _sc = directory.join(room("r"), carol).await;
        let welcome = recv_json(&mut qc).await;
        assert_eq!(welcome["participants"], serde_json::json!([]));
        assert!(directory.contains(&room("r")).await);
    }

    #[tokio::test]
    async fn rejoin_replaces_previous_connection() {
        let directory = RoomDirectory::new(16);
        let (first, mut q1) = connection(user("alice"), 8);
        let (second, mut q2) = connection(user("alice"), 8);
        let (bob, mut qb) = connection(user("bob"), 8);

        let stale = directory.join(room("r"), first.clone()).await;
        let _sb = directory.join(room("r"), bob).await;
        let _fresh = directory.join(room("r"), second.clone()).await;
        recv(&mut qb).await; // welcome

        let welcome = recv_json(&mut q2).await;
        assert_eq!(welcome["participants"], serde_json::json!(["bob"]));
        assert!(first.is_closed());
        assert_eq!(q1.next().await, None);

        // The replaced connection's leave must not remove the new one.
        stale.leave().await;
        assert_eq!(recv(&mut qb).await, None);
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn slow_participant_is_evicted_and_announced() {
        let directory = RoomDirectory::new(16);
        let (alice, mut qa) = connection(user("alice"), 16);
        let (slow, _slow_queue) = connection(user("slow"), 1);

        let sa = directory.join(room("r"), alice).await;
        let _ss = directory.join(room("r"), slow.clone()).await;
        recv(&mut qa).await; // welcome
        recv(&mut qa).await; // slow joined

        // The slow queue already holds its welcome frame.
        sa.broadcast("x".into()).await;

        let left = recv_json(&mut qa).await;
        assert_eq!(left["type"], "participant_left");
        assert_eq!(left["userId"], "slow");
        assert!(slow.is_closed());
    }

    #[tokio::test]
    async fn remove_is_idempotent_and_generation_checked() {
        let directory = RoomDirectory::new(16);
        let (alice, _qa) = connection(user("alice"), 8);
        let _sa = directory.join(room("r"), alice).await;

        let generation = directory.inner.rooms.lock().await[&room("r")].generation;
        assert!(!directory.remove(&room("r"), generation + 1).await);
        assert!(directory.contains(&room("r")).await);

        assert!(directory.remove(&room("r"), generation).await);
        assert!(!directory.remove(&room("r"), generation).await);
        assert!(!directory.contains(&room("r")).await);
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let directory = RoomDirectory::new(16);
        let (a, mut qa) = connection(user("a"), 8);
        let (b, mut qb) = connection(user("b"), 8);
        let sa = directory.join(room("one"), a).await;
        let _sb = directory.join(room("two"), b).await;
        recv(&mut qa).await;
        recv(&mut qb).await;

        sa.broadcast("hello".into()).await;
        assert_eq!(recv(&mut qb).await, None);
        assert_eq!(directory.room_count().await, 2);
    }

    #[tokio::test]
    async fn churn_never_loses_a_join() {
        let directory = RoomDirectory::new(4);
        for i in 0..50 {
            let (handle, mut queue) = connection(user(&format!("u{i}")), 8);
            let session = directory.join(room("churn"), handle).await;
            let welcome = recv_json(&mut queue).await;
            assert_eq!(welcome["type"], "welcome");
            session.leave().await;
        }
        wait_until_gone(&directory, &room("churn")).await;
    }
}
