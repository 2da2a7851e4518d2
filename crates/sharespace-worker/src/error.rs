//! Migration error classification
//!
//! The worker never retries in-process: a failed delivery is left unacked and
//! the queue redelivers it. The classification only decides how loudly the
//! failure is logged and whether redelivery can possibly help.

use sharespace_media::{MediaError, ProvisionError};
use sharespace_queue::{NotificationError, QueueError};
use sharespace_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Undecodable message body: {0}")]
    Decode(#[from] NotificationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl MigrationError {
    /// Whether a redelivery of the same message can succeed.
    ///
    /// Unrecoverable failures still end in the dead-letter queue once the
    /// receive count runs out, they are never dropped.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MigrationError::Decode(_) => false,
            MigrationError::Media(MediaError::Storage(e))
            | MigrationError::Media(MediaError::Provision(ProvisionError::Storage(e))) => {
                !matches!(
                    e,
                    StorageError::InvalidKey(_) | StorageError::ConfigError(_)
                )
            }
            MigrationError::Media(MediaError::Forbidden(_))
            | MigrationError::Media(MediaError::PostNotFound(_)) => false,
            MigrationError::Media(_) => true,
            MigrationError::Queue(QueueError::ConfigError(_)) => false,
            MigrationError::Queue(_) => true,
        }
    }
}
