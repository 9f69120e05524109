//! Per-user notification multiplexer.
//!
//! A user may be connected from several devices at once. Targeted events
//! (incoming calls, call state changes, relayed WebRTC signals) go to every
//! live connection of the user.
//!
//! Critical sections never await I/O: delivery uses `try_send` on each
//! connection's queue, and a connection that cannot accept a frame is
//! closed and removed on the spot.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{ConnectionId, UserId};
use crate::ports::{DeliveryError, UserNotifier};

use super::connection::ConnectionHandle;

/// Maps each user to their live notification connections.
#[derive(Default)]
pub struct NotificationMultiplexer {
    users: RwLock<HashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>>,
}

impl NotificationMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to its user's set and returns its id.
    pub async fn connect(&self, handle: ConnectionHandle) -> ConnectionId {
        let id = handle.id();
        let user_id = handle.user_id().clone();
        let mut users = self.users.write().await;
        let devices = users.entry(user_id.clone()).or_default();
        devices.insert(id, handle);
        tracing::debug!(user_id = %user_id, connection_id = %id, devices = devices.len(), "Notification connection added");
        id
    }

    /// Removes and closes one connection. Unknown ids are ignored.
    pub async fn disconnect(&self, user_id: &UserId, connection_id: ConnectionId) {
        let mut users = self.users.write().await;
        let Some(devices) = users.get_mut(user_id) else {
            return;
        };
        if let Some(handle) = devices.remove(&connection_id) {
            handle.close();
            tracing::debug!(user_id = %user_id, connection_id = %connection_id, "Notification connection removed");
        }
        if devices.is_empty() {
            users.remove(user_id);
        }
    }

    /// Delivers `payload` to every live connection of `user_id`.
    ///
    /// Returns how many connections accepted the frame. Connections that
    /// are full or already closed are evicted.
    pub async fn send_to_user(&self, user_id: &UserId, payload: &str) -> Result<usize, DeliveryError> {
        let mut users = self.users.write().await;
        let Some(devices) = users.get_mut(user_id) else {
            return Err(DeliveryError::NotConnected(user_id.clone()));
        };

        let mut delivered = 0;
        devices.retain(|id, handle| match handle.try_send(payload.to_owned()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(failure) => {
                tracing::warn!(
                    user_id = %user_id,
                    connection_id = %id,
                    reason = ?failure,
                    "Evicting notification connection"
                );
                handle.close();
                false
            }
        });

        if devices.is_empty() {
            users.remove(user_id);
        }

        if delivered == 0 {
            return Err(DeliveryError::NotConnected(user_id.clone()));
        }
        Ok(delivered)
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.users.read().await.contains_key(user_id)
    }

    pub async fn connection_count(&self, user_id: &UserId) -> usize {
        self.users
            .read()
            .await
            .get(user_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl UserNotifier for NotificationMultiplexer {
    async fn send_to_user(&self, user_id: &UserId, payload: &str) -> Result<usize, DeliveryError> {
        NotificationMultiplexer::send_to_user(self, user_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::connection::connection;
    use std::sync::Arc;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_device() {
        let mux = NotificationMultiplexer::new();
        let (phone, mut phone_queue) = connection(user("bob"), 8);
        let (laptop, mut laptop_queue) = connection(user("bob"), 8);
        mux.connect(phone).await;
        mux.connect(laptop).await;

        assert_eq!(mux.send_to_user(&user("bob"), "ring").await, Ok(2));
        assert_eq!(phone_queue.next().await.as_deref(), Some("ring"));
        assert_eq!(laptop_queue.next().await.as_deref(), Some("ring"));
    }

    #[tokio::test]
    async fn offline_user_is_not_connected() {
        let mux = NotificationMultiplexer::new();
        assert_eq!(
            mux.send_to_user(&user("carol"), "x").await,
            Err(DeliveryError::NotConnected(user("carol")))
        );
    }

    #[tokio::test]
    async fn disconnect_removes_one_device_and_then_the_user() {
        let mux = NotificationMultiplexer::new();
        let (a, _qa) = connection(user("bob"), 8);
        let (b, _qb) = connection(user("bob"), 8);
        let a_id = mux.connect(a.clone()).await;
        let b_id = mux.connect(b).await;

        mux.disconnect(&user("bob"), a_id).await;
        assert!(a.is_closed());
        assert_eq!(mux.connection_count(&user("bob")).await, 1);
        assert!(mux.is_online(&user("bob")).await);

        mux.disconnect(&user("bob"), b_id).await;
        assert!(!mux.is_online(&user("bob")).await);
        assert_eq!(mux.connection_count(&user("bob")).await, 0);
    }

    #[tokio::test]
    async fn full_device_is_evicted_and_others_still_receive() {
        let mux = NotificationMultiplexer::new();
        let (slow, _slow_queue) = connection(user("bob"), 1);
        let (fast, mut fast_queue) = connection(user("bob"), 8);
        mux.connect(slow.clone()).await;
        mux.connect(fast).await;

        assert_eq!(mux.send_to_user(&user("bob"), "1").await, Ok(2));
        assert_eq!(mux.send_to_user(&user("bob"), "2").await, Ok(1));

        assert!(slow.is_closed());
        assert_eq!(mux.connection_count(&user("bob")).await, 1);
        assert_eq!(fast_queue.next().await.as_deref(), Some("1"));
        assert_eq!(fast_queue.next().await.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn closed_only_connection_reads_as_not_connected() {
        let mux = NotificationMultiplexer::new();
        let (handle, queue) = connection(user("bob"), 8);
        mux.connect(handle).await;
        drop(queue);

        assert!(mux.send_to_user(&user("bob"), "x").await.is_err());
        assert!(!mux.is_online(&user("bob")).await);
    }

    #[tokio::test]
    async fn concurrent_connects_and_sends_do_not_deadlock() {
        let mux = Arc::new(NotificationMultiplexer::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let mux = mux.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _queue) = connection(user("bob"), 64);
                let id = mux.connect(handle).await;
                let _ = mux.send_to_user(&user("bob"), &format!("{i}")).await;
                mux.disconnect(&user("bob"), id).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(!mux.is_online(&user("bob")).await);
    }
}
