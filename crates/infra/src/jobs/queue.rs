//! Job queue boundary between the poller and the executor.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use signalbox_core::MessageId;

/// A unit of work: one outbox row handed to the executor.
///
/// Carries the serialized payload, not the typed notification; the relay
/// decodes it at execution time through the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct EventJob {
    pub message_id: MessageId,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("enqueue failed: {0}")]
    Enqueue(String),
}

/// Where the poller hands off claimed messages.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: EventJob) -> Result<(), JobQueueError>;
}

/// Channel-backed [`JobQueue`] feeding an in-process [`JobRunner`].
///
/// [`JobRunner`]: crate::jobs::JobRunner
#[derive(Clone)]
pub struct InMemoryJobQueue {
    tx: mpsc::UnboundedSender<EventJob>,
}

impl InMemoryJobQueue {
    /// The queue and the receiver the runner consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: EventJob) -> Result<(), JobQueueError> {
        self.tx
            .send(job)
            .map_err(|_| JobQueueError::Enqueue("job receiver dropped".to_string()))
    }
}
