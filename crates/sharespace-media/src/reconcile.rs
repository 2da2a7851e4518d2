//! Background repair of states the request path and the workers can leave behind.
//!
//! - Orphans: an upload was staged but its notification never reached the
//!   queue. Unannounced staged objects older than a grace period get one.
//! - Duplicates: two worker processes provisioned the same tenant at once.
//!   The oldest container is kept and the others are folded into it.

use crate::error::MediaResult;
use crate::naming::{sort_oldest_first, NamingResolver};
use crate::staging::StagingStore;
use chrono::{DateTime, Utc};
use sharespace_core::{ContainerRef, TenantId};
use sharespace_queue::{encode_notification, MigrationQueue};
use sharespace_storage::{ContainerInfo, ObjectStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub kept: Option<ContainerRef>,
    pub containers_removed: usize,
    pub objects_moved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub republished: usize,
    pub containers_removed: usize,
    pub objects_moved: usize,
}

pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    naming: Arc<NamingResolver>,
    staging: Arc<StagingStore>,
    queue: Arc<dyn MigrationQueue>,
    orphan_grace: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        naming: Arc<NamingResolver>,
        staging: Arc<StagingStore>,
        queue: Arc<dyn MigrationQueue>,
        orphan_grace: Duration,
    ) -> Self {
        Self {
            store,
            naming,
            staging,
            queue,
            orphan_grace,
        }
    }

    /// Publish a notification for every staged upload older than the grace
    /// period that was never announced. Objects without a modification time
    /// count as old.
    ///
    /// Each staged write is announced at most once. A notification that was
    /// published and later dead-lettered is therefore not brought back; only a
    /// new upload of the post starts another migration.
    #[tracing::instrument(skip(self))]
    pub async fn republish_orphans(&self) -> MediaResult<usize> {
        let grace = chrono::Duration::from_std(self.orphan_grace)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let cutoff = Utc::now().checked_sub_signed(grace);
        let is_old = |modified: Option<DateTime<Utc>>| match (modified, cutoff) {
            (Some(modified), Some(cutoff)) => modified <= cutoff,
            (None, _) => true,
            (Some(_), None) => false,
        };

        let mut republished = 0;
        for staged in self.staging.list().await? {
            if staged.announced || !is_old(staged.last_modified) {
                continue;
            }

            self.queue
                .publish(&encode_notification(&staged.key.notification()))
                .await?;
            self.staging.mark_announced(&staged.key).await?;
            tracing::info!(key = %staged.key, "Republished migration for orphaned staged upload");
            republished += 1;
        }

        for marker in self.staging.stray_markers().await? {
            if is_old(marker.last_modified) {
                self.staging.delete_marker(&marker.key).await?;
                tracing::debug!(key = %marker.key, "Removed announce marker without staged upload");
            }
        }

        Ok(republished)
    }

    /// Fold a tenant's duplicate containers into the oldest one.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn merge_duplicates(&self, tenant: TenantId) -> MediaResult<MergeReport> {
        let containers = self.naming.find_all(tenant).await?;
        self.merge(tenant, containers).await
    }

    /// [`Reconciler::merge_duplicates`] for every tenant that has more than one container.
    #[tracing::instrument(skip(self))]
    pub async fn merge_all_duplicates(&self) -> MediaResult<Vec<MergeReport>> {
        let mut by_tenant: BTreeMap<TenantId, Vec<ContainerInfo>> = BTreeMap::new();
        for container in self.store.list_containers().await? {
            if let Some(tenant) = self.naming.tenant_of(&container.name) {
                by_tenant.entry(tenant).or_default().push(container);
            }
        }

        let mut reports = Vec::new();
        for (tenant, mut containers) in by_tenant {
            if containers.len() < 2 {
                continue;
            }
            sort_oldest_first(&mut containers);
            reports.push(self.merge(tenant, containers).await?);
        }
        Ok(reports)
    }

    /// Orphan republish and duplicate merge in one pass.
    pub async fn sweep(&self) -> MediaResult<SweepReport> {
        let republished = self.republish_orphans().await?;
        let merges = self.merge_all_duplicates().await?;
        Ok(SweepReport {
            republished,
            containers_removed: merges.iter().map(|m| m.containers_removed).sum(),
            objects_moved: merges.iter().map(|m| m.objects_moved).sum(),
        })
    }

    /// `containers` must already be sorted oldest first.
    async fn merge(
        &self,
        tenant: TenantId,
        containers: Vec<ContainerInfo>,
    ) -> MediaResult<MergeReport> {
        let mut containers = containers.into_iter();
        let Some(keeper) = containers.next() else {
            return Ok(MergeReport::default());
        };

        let mut report = MergeReport {
            kept: Some(ContainerRef::new(keeper.name.clone())),
            ..MergeReport::default()
        };

        for duplicate in containers {
            for object in self.store.list_objects(&duplicate.name).await? {
                // Existing keys in the keeper are left untouched
                if !self.store.exists(&keeper.name, &object.key).await? {
                    self.store
                        .copy(&duplicate.name, &object.key, &keeper.name, &object.key)
                        .await?;
                    report.objects_moved += 1;
                }
                self.store.delete(&duplicate.name, &object.key).await?;
            }
            self.store.delete_container(&duplicate.name).await?;
            report.containers_removed += 1;

            tracing::warn!(
                tenant_id = %tenant,
                kept = %keeper.name,
                removed = %duplicate.name,
                "Merged duplicate tenant container"
            );
        }

        Ok(report)
    }
}
