use bytes::Bytes;
use sharespace_core::{Config, PostId, TenantId};
use sharespace_media::{Detached, MediaPipeline};
use sharespace_queue::{InMemoryQueue, MigrationQueue};
use sharespace_storage::InMemoryObjectStore;
use sharespace_worker::{MigrationWorkerPool, ReconcileService, WorkerPoolConfig};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "test-secret-that-is-at-least-32-characters";
const VISIBILITY: Duration = Duration::from_millis(50);

struct Harness {
    store: Arc<InMemoryObjectStore>,
    queue: Arc<InMemoryQueue>,
    pipeline: MediaPipeline,
}

async fn harness(max_receive_count: u32, orphan_grace_secs: u64) -> Harness {
    let mut config = Config::in_memory(SECRET);
    config.worker.staging_orphan_grace_secs = orphan_grace_secs;

    let store = Arc::new(InMemoryObjectStore::new(SECRET));
    let queue = Arc::new(InMemoryQueue::new(VISIBILITY, max_receive_count));
    let pipeline = MediaPipeline::new(
        &config,
        store.clone(),
        queue.clone(),
        Arc::new(Detached),
        Arc::new(Detached),
    );
    pipeline.staging.ensure_container().await.unwrap();

    Harness {
        store,
        queue,
        pipeline,
    }
}

fn pool_config(max_receive_count: u32, wait_time: Duration) -> WorkerPoolConfig {
    WorkerPoolConfig {
        max_concurrency: 2,
        batch_size: 10,
        wait_time,
        max_receive_count,
    }
}

impl Harness {
    fn pool(&self, config: WorkerPoolConfig) -> MigrationWorkerPool {
        MigrationWorkerPool::new_no_worker(self.queue.clone(), self.pipeline.migrator.clone(), config)
    }

    /// Stage an upload and publish its notification, as the gateway does.
    async fn upload(&self, tenant: i64, post: i64) {
        let key = self
            .pipeline
            .staging
            .put(TenantId(tenant), PostId(post), Bytes::from_static(b"image"))
            .await
            .unwrap();
        self.queue
            .publish(&format!(r#"{{"tenant_id":{},"post_id":{}}}"#, tenant, post))
            .await
            .unwrap();
        self.pipeline.staging.mark_announced(&key).await.unwrap();
        assert_eq!(key.object_key(), format!("{}-{}.jpg", tenant, post));
    }

    async fn media_count(&self, tenant: i64) -> usize {
        self.pipeline
            .access
            .list_all(TenantId(tenant))
            .await
            .unwrap()
            .len()
    }
}

#[tokio::test]
async fn run_once_migrates_and_acknowledges() {
    let h = harness(5, 600).await;
    h.upload(7, 1).await;
    h.upload(7, 2).await;
    h.upload(8, 1).await;

    let report = h.pool(pool_config(5, Duration::ZERO)).run_once().await.unwrap();

    assert_eq!(report.received, 3);
    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 0);
    assert!(h.queue.is_empty());
    assert!(h.store.object_keys("sharespace-staging").is_empty());
    assert_eq!(h.media_count(7).await, 2);
    assert_eq!(h.media_count(8).await, 1);
}

#[tokio::test]
async fn transient_failure_is_redelivered() {
    let h = harness(5, 600).await;
    h.upload(7, 42).await;
    h.store.fail_next_copies(1);
    let pool = h.pool(pool_config(5, Duration::ZERO));

    let report = pool.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(h.queue.len(), 1);
    assert_eq!(
        h.store.object_keys("sharespace-staging"),
        vec!["7-42.jpg".to_string(), "7-42.jpg.announced".to_string()]
    );

    tokio::time::sleep(VISIBILITY * 2).await;
    let report = pool.run_once().await.unwrap();
    assert_eq!(report.completed, 1);
    assert!(h.queue.is_empty());
    assert_eq!(h.media_count(7).await, 1);
}

#[tokio::test]
async fn undecodable_body_is_released_into_dead_letters() {
    let h = harness(2, 600).await;
    h.queue.publish("not a notification").await.unwrap();
    let pool = h.pool(pool_config(2, Duration::ZERO));

    // No sleeps: each failed delivery is visible again right away
    for _ in 0..2 {
        let report = pool.run_once().await.unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.failed, 1);
    }

    let report = pool.run_once().await.unwrap();
    assert_eq!(report.received, 0);
    assert!(h.queue.is_empty());
    assert_eq!(h.queue.dead_letters(), vec!["not a notification".to_string()]);
}

#[tokio::test]
async fn recoverable_failure_waits_out_visibility() {
    let h = harness(5, 600).await;
    h.upload(7, 42).await;
    h.store.fail_next_copies(1);
    let pool = h.pool(pool_config(5, Duration::ZERO));

    assert_eq!(pool.run_once().await.unwrap().failed, 1);
    assert_eq!(pool.run_once().await.unwrap().received, 0);
}

#[tokio::test]
async fn dead_lettered_upload_stays_dead_after_sweeps() {
    let h = harness(2, 0).await;
    h.upload(7, 1).await;
    h.store.reject_next_creates(u32::MAX);
    let pool = h.pool(pool_config(2, Duration::ZERO));

    for _ in 0..3 {
        pool.run_once().await.unwrap();
        tokio::time::sleep(VISIBILITY * 2).await;
    }
    assert!(h.queue.is_empty());
    assert_eq!(h.queue.dead_letters().len(), 1);

    for _ in 0..3 {
        let report = h.pipeline.reconciler.sweep().await.unwrap();
        assert_eq!(report.republished, 0);
    }
    assert!(h.queue.is_empty());
    assert!(h
        .store
        .object_keys("sharespace-staging")
        .contains(&"7-1.jpg".to_string()));
}

#[tokio::test]
async fn storage_test_event_is_acknowledged() {
    let h = harness(5, 600).await;
    h.queue
        .publish(r#"{"Service":"Amazon S3","Event":"s3:TestEvent","Bucket":"sharespace-staging"}"#)
        .await
        .unwrap();

    let report = h.pool(pool_config(5, Duration::ZERO)).run_once().await.unwrap();
    assert_eq!(report.completed, 1);
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn spawned_pool_drains_queue_until_shutdown() {
    let h = harness(5, 600).await;
    let pool = MigrationWorkerPool::new(
        h.queue.clone(),
        h.pipeline.migrator.clone(),
        pool_config(5, Duration::from_millis(20)),
    );

    for post in 1..=5 {
        h.upload(7, post).await;
    }

    for _ in 0..100 {
        if h.queue.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(h.queue.is_empty());

    pool.shutdown().await;
    assert!(pool.drain(Duration::from_secs(1)).await);
    assert_eq!(h.media_count(7).await, 5);
}

#[tokio::test]
async fn reconcile_service_republishes_orphans() {
    let h = harness(5, 0).await;
    h.pipeline
        .staging
        .put(TenantId(7), PostId(42), Bytes::from_static(b"image"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let service = ReconcileService::new(h.pipeline.reconciler.clone(), Duration::from_secs(60));
    service.run_once().await;
    assert_eq!(h.queue.len(), 1);

    let report = h.pool(pool_config(5, Duration::ZERO)).run_once().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(h.media_count(7).await, 1);
}

#[tokio::test]
async fn reconcile_service_disabled_with_zero_period() {
    let h = harness(5, 600).await;
    let service = Arc::new(ReconcileService::new(
        h.pipeline.reconciler.clone(),
        Duration::ZERO,
    ));
    assert!(service.start().is_none());
}
