use crate::traits::{Delivery, MigrationQueue, QueueError, QueueResult};
use crate::QueueBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::ProvideErrorMetadata;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use std::time::Duration;

/// SQS limit on messages per receive call
const SQS_MAX_BATCH: u32 = 10;
/// SQS limit on long-poll wait
const SQS_MAX_WAIT_SECS: u64 = 20;

/// Amazon SQS queue.
///
/// Redelivery and dead-lettering follow the queue's own visibility timeout and
/// redrive policy. FIFO queues (URL ending in `.fifo`) receive a message group
/// id and a unique deduplication id with every publish.
#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    message_group_id: Option<String>,
}

impl SqsQueue {
    pub async fn new(
        queue_url: String,
        region: Option<String>,
        message_group_id: String,
    ) -> QueueResult<Self> {
        let region_provider = RegionProviderChain::first_try(region.map(aws_config::Region::new))
            .or_default_provider();

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config)
            .load()
            .await;

        Ok(Self::from_client(
            Client::new(&config),
            queue_url,
            message_group_id,
        ))
    }

    pub fn from_client(client: Client, queue_url: String, message_group_id: String) -> Self {
        let message_group_id = queue_url.ends_with(".fifo").then_some(message_group_id);
        Self {
            client,
            queue_url,
            message_group_id,
        }
    }

    pub fn is_fifo(&self) -> bool {
        self.message_group_id.is_some()
    }
}

#[async_trait]
impl MigrationQueue for SqsQueue {
    async fn publish(&self, body: &str) -> QueueResult<String> {
        let start = std::time::Instant::now();

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);
        if let Some(group) = &self.message_group_id {
            request = request
                .message_group_id(group)
                .message_deduplication_id(uuid::Uuid::new_v4().simple().to_string());
        }

        let output = request.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                queue_url = %self.queue_url,
                "SQS send_message failed"
            );
            QueueError::PublishFailed(e.to_string())
        })?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        tracing::debug!(
            queue_url = %self.queue_url,
            message_id = %message_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "SQS message sent"
        );
        Ok(message_id)
    }

    async fn receive(&self, max_messages: u32, wait: Duration) -> QueueResult<Vec<Delivery>> {
        let max_messages = max_messages.clamp(1, SQS_MAX_BATCH);
        let wait_secs = wait.as_secs().min(SQS_MAX_WAIT_SECS);

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages as i32)
            .wait_time_seconds(wait_secs as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    queue_url = %self.queue_url,
                    "SQS receive_message failed"
                );
                QueueError::ReceiveFailed(e.to_string())
            })?;

        let deliveries = output
            .messages()
            .iter()
            .filter_map(|message| {
                let Some(receipt) = message.receipt_handle() else {
                    tracing::warn!(
                        message_id = ?message.message_id(),
                        "SQS message without receipt handle, skipping"
                    );
                    return None;
                };
                let receive_count = message
                    .attributes()
                    .and_then(|a| a.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                Some(Delivery {
                    message_id: message.message_id().unwrap_or_default().to_string(),
                    receipt: receipt.to_string(),
                    receive_count,
                    body: message.body().unwrap_or_default().to_string(),
                })
            })
            .collect::<Vec<_>>();

        if !deliveries.is_empty() {
            tracing::debug!(
                queue_url = %self.queue_url,
                message_count = deliveries.len(),
                "SQS messages received"
            );
        }
        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("ReceiptHandleIsInvalid") => QueueError::InvalidReceipt(receipt.to_string()),
                _ => {
                    tracing::error!(
                        error = %e,
                        queue_url = %self.queue_url,
                        "SQS delete_message failed"
                    );
                    QueueError::AckFailed(e.to_string())
                }
            })?;
        Ok(())
    }

    async fn release(&self, receipt: &str) -> QueueResult<()> {
        // Visibility 0 makes the message immediately receivable again
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("ReceiptHandleIsInvalid") | Some("MessageNotInflight") => {
                    QueueError::InvalidReceipt(receipt.to_string())
                }
                _ => {
                    tracing::error!(
                        error = %e,
                        queue_url = %self.queue_url,
                        "SQS change_message_visibility failed"
                    );
                    QueueError::BackendError(e.to_string())
                }
            })?;
        Ok(())
    }

    fn backend_type(&self) -> QueueBackend {
        QueueBackend::Sqs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new("eu-west-1"))
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn fifo_detected_from_queue_url() {
        let fifo = SqsQueue::from_client(
            client(),
            "https://sqs.eu-west-1.amazonaws.com/123456789012/media.fifo".to_string(),
            "media".to_string(),
        );
        assert!(fifo.is_fifo());

        let standard = SqsQueue::from_client(
            client(),
            "https://sqs.eu-west-1.amazonaws.com/123456789012/media".to_string(),
            "media".to_string(),
        );
        assert!(!standard.is_fifo());
        assert_eq!(standard.backend_type(), QueueBackend::Sqs);
    }
}
