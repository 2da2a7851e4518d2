//! Migration worker pool: long-polls the queue and migrates every notification
//! it receives, bounded by a semaphore.
//!
//! A delivery is acknowledged only after all of its notifications migrated.
//! A recoverable failure leaves it unacked, so the queue redelivers it after
//! the visibility timeout. A permanent failure releases it at once. Either way
//! the queue dead-letters it at the receive limit.
//!
//! Shutdown: [`MigrationWorkerPool::shutdown`] stops the receive loop. In-flight
//! migrations keep running; [`MigrationWorkerPool::drain`] waits for them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use sharespace_core::Config;
use sharespace_media::Migrator;
use sharespace_queue::{decode_body, Delivery, MigrationQueue, QueueResult};

use crate::error::MigrationError;

/// Pause after a failed receive before polling again.
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    pub max_concurrency: usize,
    /// Messages requested per receive call.
    pub batch_size: u32,
    /// Long-poll wait per receive call.
    pub wait_time: Duration,
    /// Receive count at which a failing message is about to be dead-lettered.
    pub max_receive_count: u32,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            batch_size: 10,
            wait_time: Duration::from_secs(20),
            max_receive_count: 5,
        }
    }
}

impl WorkerPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.worker.max_concurrency.max(1),
            batch_size: config.worker.batch_size,
            wait_time: Duration::from_secs(config.queue.wait_time_secs),
            max_receive_count: config.queue.max_receive_count,
        }
    }
}

/// Counts for one [`MigrationWorkerPool::run_once`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    /// Deliveries migrated and acknowledged.
    pub completed: usize,
    /// Deliveries left unacked for redelivery.
    pub failed: usize,
}

#[derive(Clone)]
struct Dispatcher {
    queue: Arc<dyn MigrationQueue>,
    migrator: Arc<Migrator>,
    semaphore: Arc<Semaphore>,
    max_receive_count: u32,
}

impl Dispatcher {
    /// Wait for a free slot, then migrate the delivery on its own task.
    async fn dispatch(&self, delivery: Delivery) -> JoinHandle<bool> {
        let permit = self.semaphore.clone().acquire_owned().await.ok();
        let queue = self.queue.clone();
        let migrator = self.migrator.clone();
        let max_receive_count = self.max_receive_count;

        tokio::spawn(async move {
            let _permit = permit;
            let message_id = delivery.message_id.clone();
            let receipt = delivery.receipt.clone();
            let receive_count = delivery.receive_count;

            match process_delivery(queue.as_ref(), &migrator, delivery, max_receive_count).await {
                Ok(migrated) => {
                    tracing::debug!(
                        message_id = %message_id,
                        notifications = migrated,
                        "Delivery processed and acknowledged"
                    );
                    true
                }
                Err(e) if e.is_recoverable() => {
                    tracing::error!(
                        message_id = %message_id,
                        receive_count,
                        error = %e,
                        "Migration failed, message left for redelivery"
                    );
                    false
                }
                Err(e) => {
                    tracing::error!(
                        message_id = %message_id,
                        receive_count,
                        error = %e,
                        "Migration failed permanently, message released towards the dead-letter queue"
                    );
                    if let Err(release_err) = queue.release(&receipt).await {
                        tracing::warn!(
                            message_id = %message_id,
                            error = %release_err,
                            "Failed to release message"
                        );
                    }
                    false
                }
            }
        })
    }
}

/// Migrate every notification carried by `delivery`, then acknowledge it.
/// Returns the number of notifications handled.
#[tracing::instrument(
    skip(queue, migrator, delivery),
    fields(message_id = %delivery.message_id, receive_count = delivery.receive_count)
)]
async fn process_delivery(
    queue: &dyn MigrationQueue,
    migrator: &Migrator,
    delivery: Delivery,
    max_receive_count: u32,
) -> Result<usize, MigrationError> {
    if delivery.receive_count >= max_receive_count {
        tracing::warn!(
            max_receive_count,
            "Last delivery attempt before the message is dead-lettered"
        );
    }

    let notifications = decode_body(&delivery.body)?;
    if notifications.is_empty() {
        tracing::debug!("Delivery carries no notifications");
    }

    for notification in &notifications {
        migrator.migrate(notification).await?;
    }

    queue.ack(&delivery.receipt).await?;
    Ok(notifications.len())
}

pub struct MigrationWorkerPool {
    dispatcher: Dispatcher,
    config: WorkerPoolConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl MigrationWorkerPool {
    /// Create the pool and spawn its receive loop.
    pub fn new(
        queue: Arc<dyn MigrationQueue>,
        migrator: Arc<Migrator>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let dispatcher = Self::dispatcher(queue, migrator, &config);

        let loop_dispatcher = dispatcher.clone();
        let loop_config = config.clone();
        tokio::spawn(async move {
            Self::receive_loop(loop_dispatcher, loop_config, shutdown_rx).await;
        });

        Self {
            dispatcher,
            config,
            shutdown_tx,
        }
    }

    /// Create a pool without a receive loop; drive it with [`MigrationWorkerPool::run_once`].
    pub fn new_no_worker(
        queue: Arc<dyn MigrationQueue>,
        migrator: Arc<Migrator>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            dispatcher: Self::dispatcher(queue, migrator, &config),
            config,
            shutdown_tx,
        }
    }

    fn dispatcher(
        queue: Arc<dyn MigrationQueue>,
        migrator: Arc<Migrator>,
        config: &WorkerPoolConfig,
    ) -> Dispatcher {
        Dispatcher {
            queue,
            migrator,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            max_receive_count: config.max_receive_count,
        }
    }

    async fn receive_loop(
        dispatcher: Dispatcher,
        config: WorkerPoolConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_concurrency = config.max_concurrency,
            batch_size = config.batch_size,
            wait_time_secs = config.wait_time.as_secs(),
            queue_backend = %dispatcher.queue.backend_type(),
            "Migration worker pool started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Migration worker pool shutting down");
                    break;
                }
                received = dispatcher.queue.receive(config.batch_size, config.wait_time) => {
                    match received {
                        Ok(deliveries) => {
                            if deliveries.is_empty() {
                                tracing::trace!("No messages available");
                            }
                            for delivery in deliveries {
                                dispatcher.dispatch(delivery).await;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to receive from migration queue");
                            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        tracing::info!("Migration worker pool stopped");
    }

    /// Receive one batch, migrate it and wait for every delivery to finish.
    pub async fn run_once(&self) -> QueueResult<BatchReport> {
        let deliveries = self
            .dispatcher
            .queue
            .receive(self.config.batch_size, self.config.wait_time)
            .await?;

        let mut report = BatchReport {
            received: deliveries.len(),
            ..BatchReport::default()
        };

        let mut handles = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            handles.push(self.dispatcher.dispatch(delivery).await);
        }
        for handle in handles {
            match handle.await {
                Ok(true) => report.completed += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Migration task panicked");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Signals the receive loop to stop. Returns immediately; in-flight
    /// migrations are not interrupted.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating migration worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Wait up to `timeout` for in-flight migrations. Returns whether all finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let slots = self.config.max_concurrency.max(1) as u32;
        let semaphore = self.dispatcher.semaphore.clone();
        let acquired = tokio::time::timeout(timeout, semaphore.acquire_many(slots)).await;
        match acquired {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "In-flight migrations still running at shutdown"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.wait_time, Duration::from_secs(20));
        assert_eq!(config.max_receive_count, 5);
    }

    fn idle_pool(max_concurrency: usize) -> MigrationWorkerPool {
        let app = Config::in_memory("test-secret-that-is-at-least-32-characters");
        let queue = Arc::new(sharespace_queue::InMemoryQueue::new(Duration::from_secs(30), 5));
        let store = Arc::new(sharespace_storage::InMemoryObjectStore::new(
            "test-secret-that-is-at-least-32-characters",
        ));
        let pipeline = sharespace_media::MediaPipeline::new(
            &app,
            store,
            queue.clone(),
            Arc::new(sharespace_media::Detached),
            Arc::new(sharespace_media::Detached),
        );
        MigrationWorkerPool::new_no_worker(
            queue,
            pipeline.migrator,
            WorkerPoolConfig {
                max_concurrency,
                ..WorkerPoolConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn drain_returns_at_once_when_idle() {
        let pool = idle_pool(3);
        assert!(pool.drain(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn drain_times_out_while_a_migration_holds_a_slot() {
        let pool = idle_pool(2);
        let busy = pool.dispatcher.semaphore.clone().acquire_owned().await.unwrap();

        assert!(!pool.drain(Duration::from_millis(10)).await);
        drop(busy);
        assert!(pool.drain(Duration::from_millis(10)).await);
    }

    #[test]
    fn config_is_read_from_app_config() {
        let mut app = Config::in_memory("test-secret-that-is-at-least-32-characters");
        app.worker.max_concurrency = 0;
        app.worker.batch_size = 3;
        app.queue.wait_time_secs = 1;

        let config = WorkerPoolConfig::from_config(&app);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.wait_time, Duration::from_secs(1));
    }
}
