use crate::error::ProvisionError;
use crate::naming::NamingResolver;
use sharespace_core::{ContainerRef, TenantId};
use sharespace_storage::{ObjectStore, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process advisory locks keyed by tenant.
///
/// Serialises provisioning for one tenant inside a single worker process.
/// Separate processes can still race; the reconciler merges what they leave.
#[derive(Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, tenant: TenantId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(tenant).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Obtains the tenant's container, creating it on first use.
pub struct ContainerProvisioner {
    store: Arc<dyn ObjectStore>,
    naming: Arc<NamingResolver>,
    locks: TenantLocks,
    max_attempts: u32,
}

impl ContainerProvisioner {
    pub fn new(store: Arc<dyn ObjectStore>, naming: Arc<NamingResolver>, max_attempts: u32) -> Self {
        Self {
            store,
            naming,
            locks: TenantLocks::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Return the tenant's existing container or create one.
    ///
    /// Creation retries with a fresh suffix while the candidate name is taken
    /// in the global namespace, up to `max_attempts` creations.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn provision(&self, tenant: TenantId) -> Result<ContainerRef, ProvisionError> {
        if let Some(existing) = self.naming.resolve_existing(tenant).await? {
            return Ok(existing);
        }

        let _guard = self.locks.lock(tenant).await;
        if let Some(existing) = self.naming.resolve_existing(tenant).await? {
            tracing::debug!(container = %existing, "Container created while waiting for lock");
            return Ok(existing);
        }

        let start = std::time::Instant::now();
        for attempt in 1..=self.max_attempts {
            let candidate = self.naming.candidate(tenant);
            match self.store.create_container(candidate.name()).await {
                Ok(()) => {
                    tracing::info!(
                        container = %candidate,
                        attempt,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Tenant container provisioned"
                    );
                    return Ok(candidate);
                }
                Err(StorageError::ContainerNameTaken(_)) => {
                    tracing::debug!(
                        container = %candidate,
                        attempt,
                        "Container name taken, retrying with a new suffix"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            "Container provisioning exhausted every attempt"
        );
        Err(ProvisionError::AttemptsExhausted {
            tenant_id: tenant,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_storage::InMemoryObjectStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn provisioner(
        store: Arc<InMemoryObjectStore>,
        max_attempts: u32,
    ) -> ContainerProvisioner {
        let counter = AtomicU32::new(10_000);
        let naming = NamingResolver::new(store.clone(), "tenant-id")
            .with_suffix_source(move || counter.fetch_add(1, Ordering::SeqCst));
        ContainerProvisioner::new(store, Arc::new(naming), max_attempts)
    }

    #[tokio::test]
    async fn provisioning_twice_returns_same_container() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let provisioner = provisioner(store.clone(), 20);

        let first = provisioner.provision(TenantId(7)).await.unwrap();
        let second = provisioner.provision(TenantId(7)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.create_attempts().len(), 1);
    }

    #[tokio::test]
    async fn taken_names_are_retried_with_fresh_suffix() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        store.reject_next_creates(3);
        let provisioner = provisioner(store.clone(), 20);

        let container = provisioner.provision(TenantId(7)).await.unwrap();

        let attempts = store.create_attempts();
        assert_eq!(attempts.len(), 4);
        assert_eq!(
            attempts,
            vec![
                "tenant-id-7-10000",
                "tenant-id-7-10001",
                "tenant-id-7-10002",
                "tenant-id-7-10003"
            ]
        );
        assert_eq!(container.name(), "tenant-id-7-10003");
    }

    #[tokio::test]
    async fn exhaustion_is_terminal() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        store.reject_next_creates(100);
        let provisioner = provisioner(store.clone(), 5);

        let err = provisioner.provision(TenantId(7)).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::AttemptsExhausted { tenant_id: TenantId(7), attempts: 5 }
        ));
        assert_eq!(store.create_attempts().len(), 5);
        assert!(store.container_names().is_empty());
    }

    #[tokio::test]
    async fn concurrent_provisioning_creates_one_container() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let provisioner = Arc::new(provisioner(store.clone(), 20));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provisioner = provisioner.clone();
                tokio::spawn(async move { provisioner.provision(TenantId(7)).await })
            })
            .collect();

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap().unwrap().into_name());
        }
        names.dedup();
        assert_eq!(names.len(), 1);
        assert_eq!(store.container_names().len(), 1);
    }

    #[tokio::test]
    async fn locks_are_per_tenant() {
        let locks = TenantLocks::new();
        let _seven = locks.lock(TenantId(7)).await;
        // A different tenant is not blocked by tenant 7's holder
        let _eight = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            locks.lock(TenantId(8)),
        )
        .await
        .expect("tenant 8 lock should be free");
    }
}
