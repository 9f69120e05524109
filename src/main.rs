//! Huddle server entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use huddle::adapters::auth::JwtTokenValidator;
use huddle::adapters::http::{app_router, CallHandlers};
use huddle::adapters::postgres::{self, PostgresCallRepository, PostgresMessageStore};
use huddle::adapters::pubsub::RedisBroker;
use huddle::adapters::websocket::{
    FanoutBridge, Liveness, NotificationMultiplexer, RealtimeState, RoomDirectory, SocketSettings,
    TopicRegistry,
};
use huddle::application::{
    CallSignalingService, CallStateMachine, ChatIngestService, MessageWriter, WriterSettings,
};
use huddle::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))?;
    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Huddle starting"
    );

    let pool = postgres::connect(&config.database).await?;
    if config.database.run_migrations {
        postgres::MIGRATOR.run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let broker = tokio::time::timeout(
        config.redis.connect_timeout(),
        RedisBroker::connect(&config.redis.url),
    )
    .await??;
    tracing::info!("Connected to Redis");

    let realtime = &config.realtime;

    let message_store = Arc::new(PostgresMessageStore::new(pool.clone()));
    let writer = Arc::new(MessageWriter::start(
        message_store.clone(),
        WriterSettings {
            workers: realtime.persistence_workers,
            queue_capacity: realtime.persistence_queue_capacity,
            enqueue_timeout: realtime.enqueue_timeout(),
        },
    ));

    let notifications = Arc::new(NotificationMultiplexer::new());
    let calls = Arc::new(CallStateMachine::new(Arc::new(PostgresCallRepository::new(pool))));
    let mut signaling = CallSignalingService::new(calls, notifications.clone());
    if let Some(timeout) = realtime.ring_timeout() {
        signaling = signaling.with_ring_timeout(timeout);
    }

    let state = RealtimeState {
        fanout: FanoutBridge::new(Arc::new(broker), TopicRegistry::spawn(realtime.hub_queue_capacity)),
        chat: ChatIngestService::new(writer.clone()),
        conversations: message_store,
        notifications,
        signaling: signaling.clone(),
        rooms: RoomDirectory::new(realtime.room_queue_capacity),
        settings: SocketSettings {
            send_queue_capacity: realtime.send_queue_capacity,
            liveness: Liveness::default(),
            trust_query_identity: realtime.trust_query_identity,
        },
    };

    let validator = Arc::new(JwtTokenValidator::new(
        &config.auth.jwt_secret,
        config.auth.issuer.as_deref(),
        config.auth.leeway_secs,
    ));

    let app = app_router(
        state,
        CallHandlers::new(signaling),
        validator,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Draining persistence queue");
    writer.shutdown().await;
    tracing::info!("Huddle stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
