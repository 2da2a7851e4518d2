//! Shared fixtures for the media pipeline integration tests.
//!
//! The share/space subsystem is replaced by an in-memory directory and the
//! provider by the in-memory object store and queue.

#![allow(dead_code)]

use async_trait::async_trait;
use sharespace_core::{Config, MigrationNotification, PostId, TenantId, UserId};
use sharespace_media::{Authorizer, MediaPipeline, MigrationOutcome, NamingResolver, PostDirectory};
use sharespace_queue::{decode_body, InMemoryQueue, MigrationQueue};
use sharespace_storage::{InMemoryObjectStore, ObjectStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SECRET: &str = "test-secret-that-is-at-least-32-characters";

/// Mock share/space directory: posts with their tenant and owner, plus memberships.
#[derive(Clone, Default)]
pub struct MockDirectory {
    posts: Arc<Mutex<HashMap<PostId, (TenantId, UserId)>>>,
    members: Arc<Mutex<HashSet<(UserId, TenantId)>>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, user: UserId, tenant: TenantId) {
        self.members.lock().unwrap().insert((user, tenant));
    }

    /// Register a post; its owner becomes a member of the tenant.
    pub fn add_post(&self, post: PostId, tenant: TenantId, owner: UserId) {
        self.posts.lock().unwrap().insert(post, (tenant, owner));
        self.add_member(owner, tenant);
    }

    pub fn remove_post(&self, post: PostId) {
        self.posts.lock().unwrap().remove(&post);
    }
}

#[async_trait]
impl Authorizer for MockDirectory {
    async fn is_owner(&self, user: UserId, post: PostId) -> bool {
        self.posts
            .lock()
            .unwrap()
            .get(&post)
            .is_some_and(|(_, owner)| *owner == user)
    }

    async fn is_tenant_member(&self, user: UserId, tenant: TenantId) -> bool {
        self.members.lock().unwrap().contains(&(user, tenant))
    }
}

#[async_trait]
impl PostDirectory for MockDirectory {
    async fn tenant_of(&self, post: PostId) -> Option<TenantId> {
        self.posts.lock().unwrap().get(&post).map(|(tenant, _)| *tenant)
    }
}

pub struct TestPipeline {
    pub pipeline: MediaPipeline,
    pub store: Arc<InMemoryObjectStore>,
    pub queue: Arc<InMemoryQueue>,
    pub directory: MockDirectory,
    pub config: Config,
}

pub fn test_config() -> Config {
    let mut config = Config::in_memory(SECRET);
    config.worker.staging_orphan_grace_secs = 600;
    config
}

/// Pipeline over fresh in-memory backends with the staging container in place.
/// Container suffixes count up from 10000 so names are predictable.
pub async fn setup() -> TestPipeline {
    setup_with(test_config()).await
}

pub async fn setup_with(config: Config) -> TestPipeline {
    setup_with_store(config, |store| -> Arc<dyn ObjectStore> { store }).await
}

/// Like [`setup_with`], but the pipeline talks to whatever `wrap` builds around
/// the in-memory store. `TestPipeline::store` stays the unwrapped store.
pub async fn setup_with_store<F>(config: Config, wrap: F) -> TestPipeline
where
    F: FnOnce(Arc<InMemoryObjectStore>) -> Arc<dyn ObjectStore>,
{
    let store = Arc::new(InMemoryObjectStore::new(SECRET));
    let pipeline_store = wrap(store.clone());
    let queue = Arc::new(InMemoryQueue::new(
        Duration::from_secs(config.queue.visibility_timeout_secs),
        config.queue.max_receive_count,
    ));
    let directory = MockDirectory::new();

    let counter = AtomicU32::new(10_000);
    let naming = NamingResolver::new(
        pipeline_store.clone(),
        config.media.container_prefix.as_str(),
    )
    .with_suffix_source(move || counter.fetch_add(1, Ordering::SeqCst));

    let pipeline = MediaPipeline::with_naming(
        &config,
        pipeline_store,
        queue.clone(),
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
        naming,
    );
    pipeline.staging.ensure_container().await.unwrap();

    TestPipeline {
        pipeline,
        store,
        queue,
        directory,
        config,
    }
}

impl TestPipeline {
    /// Drain the queue the way a worker would: migrate every notification and
    /// ack each delivery whose notifications all succeeded.
    pub async fn drain(&self) -> Vec<MigrationOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let deliveries = self.queue.receive(10, Duration::ZERO).await.unwrap();
            if deliveries.is_empty() {
                return outcomes;
            }
            for delivery in deliveries {
                for notification in decode_body(&delivery.body).unwrap() {
                    outcomes.push(self.pipeline.migrator.migrate(&notification).await.unwrap());
                }
                self.queue.ack(&delivery.receipt).await.unwrap();
            }
        }
    }

    pub async fn migrate(&self, tenant: i64, post: i64) -> MigrationOutcome {
        self.pipeline
            .migrator
            .migrate(&MigrationNotification::new(TenantId(tenant), PostId(post)))
            .await
            .unwrap()
    }
}
