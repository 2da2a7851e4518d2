use crate::QueueBackend;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Acknowledge failed: {0}")]
    AckFailed(String),

    #[error("Unknown or expired receipt: {0}")]
    InvalidReceipt(String),

    #[error("Queue backend error: {0}")]
    BackendError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// One received message. The `receipt` identifies this particular delivery and is
/// what `ack` and `release` take; it changes on every redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub receipt: String,
    /// How many times the message has been handed out, this delivery included.
    pub receive_count: u32,
    pub body: String,
}

#[async_trait]
pub trait MigrationQueue: Send + Sync {
    /// Enqueue a message body and return the backend's message id.
    async fn publish(&self, body: &str) -> QueueResult<String>;

    /// Receive up to `max_messages` deliveries, waiting at most `wait` for the first one.
    async fn receive(&self, max_messages: u32, wait: Duration) -> QueueResult<Vec<Delivery>>;

    /// Remove a delivered message for good.
    async fn ack(&self, receipt: &str) -> QueueResult<()>;

    /// Give a delivery back so it becomes visible again immediately.
    async fn release(&self, receipt: &str) -> QueueResult<()>;

    fn backend_type(&self) -> QueueBackend;
}
