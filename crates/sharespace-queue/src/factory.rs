use crate::{InMemoryQueue, MigrationQueue, QueueBackend, QueueError, QueueResult};
#[cfg(feature = "queue-sqs")]
use crate::SqsQueue;
use sharespace_core::Config;
use std::sync::Arc;
use std::time::Duration;

/// Create the migration queue based on configuration
pub async fn create_queue(config: &Config) -> QueueResult<Arc<dyn MigrationQueue>> {
    match config.queue.backend {
        #[cfg(feature = "queue-sqs")]
        QueueBackend::Sqs => {
            let queue_url = config.queue.sqs_queue_url.clone().ok_or_else(|| {
                QueueError::ConfigError("SQS_QUEUE_URL not configured".to_string())
            })?;
            let region = config
                .storage
                .aws_region
                .clone()
                .or_else(|| config.s3_region().map(String::from));

            let queue =
                SqsQueue::new(queue_url, region, config.queue.sqs_message_group_id.clone()).await?;
            Ok(Arc::new(queue))
        }

        #[cfg(not(feature = "queue-sqs"))]
        QueueBackend::Sqs => Err(QueueError::ConfigError(
            "SQS queue backend not available (queue-sqs feature not enabled)".to_string(),
        )),

        QueueBackend::Memory => {
            tracing::warn!("Using in-memory migration queue; messages are lost on exit");
            Ok(Arc::new(InMemoryQueue::new(
                Duration::from_secs(config.queue.visibility_timeout_secs),
                config.queue.max_receive_count,
            )))
        }
    }
}
