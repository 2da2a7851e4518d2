use crate::error::MediaResult;
use crate::naming::NamingResolver;
use crate::staging::StagingStore;
use sharespace_core::TenantId;
use sharespace_storage::{ObjectStore, StorageError};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub containers_deleted: usize,
    pub objects_deleted: usize,
    pub staged_objects_deleted: usize,
}

/// Deletes everything a tenant stored. The caller has already decided the
/// tenant is gone; no membership check happens here.
pub struct TenantTeardown {
    store: Arc<dyn ObjectStore>,
    naming: Arc<NamingResolver>,
    staging: Arc<StagingStore>,
}

impl TenantTeardown {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        naming: Arc<NamingResolver>,
        staging: Arc<StagingStore>,
    ) -> Self {
        Self {
            store,
            naming,
            staging,
        }
    }

    /// Delete every container of the tenant with all its objects, plus staged
    /// uploads that were never migrated. A tenant without storage is a no-op.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn destroy(&self, tenant: TenantId) -> MediaResult<TeardownReport> {
        let mut report = TeardownReport::default();

        // Staged uploads first. A migration already past its staging check can
        // still provision a container; it deletes that container again when its
        // copy finds the staged object gone.
        for staged in self.staging.list_for_tenant(tenant).await? {
            self.staging.delete(&staged.key).await?;
            report.staged_objects_deleted += 1;
        }
        for marker in self.staging.stray_markers().await? {
            if marker.key.tenant_id() == tenant {
                self.staging.delete_marker(&marker.key).await?;
            }
        }

        for container in self.naming.find_all(tenant).await? {
            report.objects_deleted += self.empty_and_delete(&container.name).await?;
            report.containers_deleted += 1;
        }

        if report.containers_deleted == 0 && report.staged_objects_deleted == 0 {
            tracing::debug!("Tenant has no media storage, nothing to tear down");
        } else {
            tracing::info!(
                containers_deleted = report.containers_deleted,
                objects_deleted = report.objects_deleted,
                staged_objects_deleted = report.staged_objects_deleted,
                "Tenant media storage destroyed"
            );
        }
        Ok(report)
    }

    async fn empty_and_delete(&self, container: &str) -> MediaResult<usize> {
        let objects = match self.store.list_objects(container).await {
            Ok(objects) => objects,
            Err(StorageError::ContainerNotFound(_)) => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        for object in &objects {
            self.store.delete(container, &object.key).await?;
        }

        match self.store.delete_container(container).await {
            Ok(()) | Err(StorageError::ContainerNotFound(_)) => Ok(objects.len()),
            Err(e) => Err(e.into()),
        }
    }
}
