//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the real-time core and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `CallRepository` - Durable call records with conditional status updates
//! - `MessageStore` - Persistence collaborator for live chat messages
//! - `ConversationAccess` - Conversation membership checks
//!
//! ## Messaging Ports
//!
//! - `PubSubBroker` - Cross-process publish/subscribe transport
//!
//! - `UserNotifier` - Targeted delivery to a user's live connections
//!
//! ## Identity Ports
//!
//! - `TokenValidator` - Resolves a bearer token to a user identity

mod call_repository;
mod conversation_access;
mod message_store;
mod pubsub_broker;
mod token_validator;
mod user_notifier;

pub use call_repository::CallRepository;
pub use conversation_access::ConversationAccess;
pub use message_store::MessageStore;
pub use pubsub_broker::{BrokerError, BrokerSubscription, PubSubBroker};
pub use token_validator::{AuthError, TokenValidator};
pub use user_notifier::{DeliveryError, UserNotifier};
