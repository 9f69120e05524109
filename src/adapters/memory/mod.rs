//! In-memory storage adapters.
//!
//! Used by the test suites and for running the server without PostgreSQL.
//! They honour the same contracts as the PostgreSQL adapters, including the
//! conditional status update on calls.
//!
//! # Panics
//!
//! Methods panic if an internal lock is poisoned. Not for production use.

mod call_repository;
mod conversation_access;
mod message_store;

pub use call_repository::InMemoryCallRepository;
pub use conversation_access::InMemoryConversationAccess;
pub use message_store::InMemoryMessageStore;
