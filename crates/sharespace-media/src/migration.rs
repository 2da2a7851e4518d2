use crate::error::MediaResult;
use crate::provisioner::ContainerProvisioner;
use crate::staging::StagingStore;
use sharespace_core::{ContainerRef, MigrationNotification, TenantId};
use sharespace_storage::{ObjectStore, StorageError};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The staged object was copied into the container and removed from staging,
    /// unless a newer upload replaced it in the meantime.
    Migrated { container: ContainerRef },
    /// Nothing staged for this post: an earlier delivery already finished the job.
    AlreadyMigrated,
}

/// One migration step: staging object to tenant container.
///
/// Safe to run any number of times for the same notification, concurrently or
/// not. The queue consumer acknowledges only after this returns `Ok`.
pub struct Migrator {
    store: Arc<dyn ObjectStore>,
    staging: Arc<StagingStore>,
    provisioner: Arc<ContainerProvisioner>,
}

impl Migrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        staging: Arc<StagingStore>,
        provisioner: Arc<ContainerProvisioner>,
    ) -> Self {
        Self {
            store,
            staging,
            provisioner,
        }
    }

    #[tracing::instrument(
        skip(self),
        fields(tenant_id = %notification.tenant_id, post_id = %notification.post_id)
    )]
    pub async fn migrate(&self, notification: &MigrationNotification) -> MediaResult<MigrationOutcome> {
        let start = std::time::Instant::now();
        let staging_key = notification.staging_key(self.staging.extension());

        let Some(version) = self.staging.head(&staging_key).await? else {
            tracing::debug!(key = %staging_key, "Nothing staged, treating as already migrated");
            return Ok(MigrationOutcome::AlreadyMigrated);
        };

        let container = self.provisioner.provision(notification.tenant_id).await?;
        let media_key = staging_key.media_key().object_key();

        match self
            .store
            .copy(
                self.staging.container(),
                &staging_key.object_key(),
                container.name(),
                &media_key,
            )
            .await
        {
            Ok(()) => {}
            // Another delivery finished first, or the tenant was torn down meanwhile
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(key = %staging_key, "Staged object vanished during copy");
                self.remove_if_unused(notification.tenant_id, &container).await?;
                return Ok(MigrationOutcome::AlreadyMigrated);
            }
            Err(e) => return Err(e.into()),
        }

        if !self
            .staging
            .delete_if_unchanged(&staging_key, &version)
            .await?
        {
            tracing::info!(
                key = %staging_key,
                "Staged object replaced during migration, left for its own notification"
            );
        }

        tracing::info!(
            container = %container,
            key = %media_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Media migrated to tenant container"
        );
        Ok(MigrationOutcome::Migrated { container })
    }

    /// Delete `container` if it holds nothing and the tenant has nothing staged.
    async fn remove_if_unused(&self, tenant: TenantId, container: &ContainerRef) -> MediaResult<()> {
        if !self.staging.list_for_tenant(tenant).await?.is_empty() {
            return Ok(());
        }

        match self.store.delete_container(container.name()).await {
            Ok(()) => {
                tracing::info!(
                    tenant_id = %tenant,
                    container = %container,
                    "Removed empty container left by an interrupted migration"
                );
                Ok(())
            }
            Err(StorageError::ContainerNotEmpty(_) | StorageError::ContainerNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
