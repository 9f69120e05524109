//! Realtime layer configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Queue sizes and timers for sockets, rooms and the persistence pool.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Outbound frames buffered per connection before it is evicted
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    /// Pending commands buffered by the topic registry loop
    #[serde(default = "default_hub_queue_capacity")]
    pub hub_queue_capacity: usize,

    /// Pending commands buffered per room
    #[serde(default = "default_room_queue_capacity")]
    pub room_queue_capacity: usize,

    /// Number of persistence workers
    #[serde(default = "default_persistence_workers")]
    pub persistence_workers: usize,

    /// Messages buffered for persistence
    #[serde(default = "default_persistence_queue_capacity")]
    pub persistence_queue_capacity: usize,

    /// How long a producer waits for a persistence slot, in milliseconds
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,

    /// Seconds before an unanswered call is marked missed; 0 disables
    #[serde(default = "default_ring_timeout_secs")]
    pub ring_timeout_secs: u64,

    /// Accept `?user_id=` as identity on signaling sockets without a token
    #[serde(default)]
    pub trust_query_identity: bool,
}

impl RealtimeConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn ring_timeout(&self) -> Option<Duration> {
        (self.ring_timeout_secs > 0).then(|| Duration::from_secs(self.ring_timeout_secs))
    }

    /// Validate realtime configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let sizes = [
            ("send_queue_capacity", self.send_queue_capacity),
            ("hub_queue_capacity", self.hub_queue_capacity),
            ("room_queue_capacity", self.room_queue_capacity),
            ("persistence_workers", self.persistence_workers),
            ("persistence_queue_capacity", self.persistence_queue_capacity),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(ValidationError::ZeroRealtimeSetting(name));
        }
        if self.enqueue_timeout_ms == 0 {
            return Err(ValidationError::ZeroRealtimeSetting("enqueue_timeout_ms"));
        }
        if self.trust_query_identity && *environment == Environment::Production {
            return Err(ValidationError::QueryIdentityInProduction);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            hub_queue_capacity: default_hub_queue_capacity(),
            room_queue_capacity: default_room_queue_capacity(),
            persistence_workers: default_persistence_workers(),
            persistence_queue_capacity: default_persistence_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            ring_timeout_secs: default_ring_timeout_secs(),
            trust_query_identity: false,
        }
    }
}

fn default_send_queue_capacity() -> usize {
    256
}

fn default_hub_queue_capacity() -> usize {
    1024
}

fn default_room_queue_capacity() -> usize {
    64
}

fn default_persistence_workers() -> usize {
    4
}

fn default_persistence_queue_capacity() -> usize {
    1024
}

fn default_enqueue_timeout_ms() -> u64 {
    2000
}

fn default_ring_timeout_secs() -> u64 {
    45
}
