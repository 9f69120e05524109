//! Persistence worker pool for live chat messages.
//!
//! The socket path never waits on the database: messages go into a bounded
//! queue drained by a fixed set of workers. A full queue costs the producer
//! at most `enqueue_timeout`; after that the message is dropped from
//! persistence (it has still been delivered live).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::domain::chat::QueuedMessage;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::MessageStore;

/// Why a message was not queued for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("Persistence queue is full")]
    QueueFull,

    #[error("Persistence queue is shut down")]
    Closed,
}

impl From<EnqueueError> for DomainError {
    fn from(err: EnqueueError) -> Self {
        let code = match err {
            EnqueueError::QueueFull => ErrorCode::QueueFull,
            EnqueueError::Closed => ErrorCode::InternalError,
        };
        DomainError::new(code, err.to_string())
    }
}

/// Pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct WriterSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_secs(2),
        }
    }
}

pub struct MessageWriter {
    tx: RwLock<Option<mpsc::Sender<QueuedMessage>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    enqueue_timeout: Duration,
}

impl MessageWriter {
    /// Starts the workers.
    pub fn start(store: Arc<dyn MessageStore>, settings: WriterSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..settings.workers.max(1))
            .map(|worker| tokio::spawn(run_worker(worker, rx.clone(), store.clone())))
            .collect();

        tracing::info!(
            workers = settings.workers.max(1),
            queue_capacity = settings.queue_capacity,
            "Message writer started"
        );

        Self {
            tx: RwLock::new(Some(tx)),
            workers: Mutex::new(workers),
            enqueue_timeout: settings.enqueue_timeout,
        }
    }

    /// Queues a message, waiting at most `enqueue_timeout` for room.
    pub async fn enqueue(&self, message: QueuedMessage) -> Result<(), EnqueueError> {
        let tx = self.sender().await?;
        match tx.send_timeout(message, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(message)) => {
                tracing::warn!(message_id = %message.id, "Persistence queue full; message dropped");
                Err(EnqueueError::QueueFull)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Queues a message only if there is room right now.
    pub async fn try_enqueue(&self, message: QueuedMessage) -> Result<(), EnqueueError> {
        let tx = self.sender().await?;
        tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(message) => {
                tracing::warn!(message_id = %message.id, "Persistence queue full; message dropped");
                EnqueueError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Stops accepting messages and waits for the workers to drain the queue.
    pub async fn shutdown(&self) {
        self.tx.write().await.take();
        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Message writer worker panicked");
            }
        }
        tracing::info!("Message writer stopped");
    }

    async fn sender(&self) -> Result<mpsc::Sender<QueuedMessage>, EnqueueError> {
        self.tx.read().await.clone().ok_or(EnqueueError::Closed)
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueuedMessage>>>,
    store: Arc<dyn MessageStore>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(message) = next else {
            break;
        };
        if let Err(e) = store.create_message(&message).await {
            tracing::error!(
                worker,
                message_id = %message.id,
                conversation_id = %message.conversation_id,
                error = %e,
                "Failed to persist message"
            );
        }
    }
}
