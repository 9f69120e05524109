//! Publish/subscribe broker adapters.
//!
//! - `RedisBroker` - production transport shared by every front-end process
//! - `InMemoryBroker` - single-process broker for tests and local development

mod in_memory;
mod redis;

pub use in_memory::InMemoryBroker;
pub use redis::RedisBroker;
