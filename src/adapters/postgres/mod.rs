//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresCallRepository` - call records with conditional status updates
//! - `PostgresMessageStore` - chat history and conversation membership

mod call_repository;
mod message_store;

pub use call_repository::PostgresCallRepository;
pub use message_store::PostgresMessageStore;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Opens a connection pool sized from configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .connect(&config.url)
        .await
}
