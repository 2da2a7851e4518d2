//! Shared staging container.
//!
//! Every upload is written here first, keyed `{tenant_id}-{post_id}.{ext}`. The
//! object lives until the migration step has copied it into the tenant's own
//! container.
//!
//! Next to a staged object there may be an empty announce marker,
//! `{staging_key}.announced`. It is written once a migration notification for
//! the upload has been published, and it covers every staged write that is not
//! newer than the marker itself. The orphan sweep only republishes uploads
//! that no marker covers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sharespace_core::{PostId, StagingKey, TenantId};
use sharespace_storage::{ObjectInfo, ObjectStore, StorageResult};
use std::collections::HashMap;
use std::sync::Arc;

pub const ANNOUNCE_MARKER_SUFFIX: &str = ".announced";

/// A staged object found by [`StagingStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub key: StagingKey,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// A notification was published for this write of the object.
    pub announced: bool,
}

/// An announce marker whose staged object is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrayMarker {
    pub key: StagingKey,
    pub last_modified: Option<DateTime<Utc>>,
}

fn marker_key(key: &StagingKey) -> String {
    format!("{}{}", key.object_key(), ANNOUNCE_MARKER_SUFFIX)
}

pub struct StagingStore {
    store: Arc<dyn ObjectStore>,
    container: String,
    extension: String,
}

impl StagingStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            extension: extension.into(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn key(&self, tenant: TenantId, post: PostId) -> StagingKey {
        StagingKey::new(tenant, post, self.extension.as_str())
    }

    /// Create the staging container unless it already exists.
    ///
    /// A name owned by another account is a deployment error and is returned as
    /// `ContainerNameTaken`.
    pub async fn ensure_container(&self) -> StorageResult<()> {
        let exists = self
            .store
            .list_containers()
            .await?
            .iter()
            .any(|c| c.name == self.container);
        if exists {
            return Ok(());
        }

        self.store.create_container(&self.container).await?;
        tracing::info!(container = %self.container, "Staging container created");
        Ok(())
    }

    /// Write an upload, replacing any earlier upload for the same post.
    pub async fn put(
        &self,
        tenant: TenantId,
        post: PostId,
        data: Bytes,
    ) -> StorageResult<StagingKey> {
        let key = self.key(tenant, post);
        self.store
            .put(
                &self.container,
                &key.object_key(),
                data,
                content_type_for(&self.extension),
            )
            .await?;
        Ok(key)
    }

    pub async fn exists(&self, key: &StagingKey) -> StorageResult<bool> {
        self.store.exists(&self.container, &key.object_key()).await
    }

    /// Size, modification time and entity tag of the staged object.
    pub async fn head(&self, key: &StagingKey) -> StorageResult<Option<ObjectInfo>> {
        self.store.head(&self.container, &key.object_key()).await
    }

    /// Record that a migration notification for the current upload was published.
    pub async fn mark_announced(&self, key: &StagingKey) -> StorageResult<()> {
        self.store
            .put(
                &self.container,
                &marker_key(key),
                Bytes::new(),
                "application/octet-stream",
            )
            .await
    }

    /// Remove the staged object and its announce marker. Idempotent.
    pub async fn delete(&self, key: &StagingKey) -> StorageResult<()> {
        self.store.delete(&self.container, &key.object_key()).await?;
        self.store.delete(&self.container, &marker_key(key)).await
    }

    /// [`StagingStore::delete`], but only while the staged object is still the
    /// write described by `version`. Returns `false` when a newer write replaced it.
    ///
    /// A re-upload landing between the check and the delete is still lost; the
    /// store offers no conditional delete.
    pub async fn delete_if_unchanged(
        &self,
        key: &StagingKey,
        version: &ObjectInfo,
    ) -> StorageResult<bool> {
        match self.head(key).await? {
            Some(current) if current.same_version(version) => {
                self.delete(key).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                self.store.delete(&self.container, &marker_key(key)).await?;
                Ok(true)
            }
        }
    }

    /// Every staged object whose key parses as a staging key.
    pub async fn list(&self) -> StorageResult<Vec<StagedObject>> {
        Ok(self.scan().await?.0)
    }

    /// Announce markers left behind without a staged object.
    pub async fn stray_markers(&self) -> StorageResult<Vec<StrayMarker>> {
        Ok(self.scan().await?.1)
    }

    /// Remove an announce marker on its own.
    pub async fn delete_marker(&self, key: &StagingKey) -> StorageResult<()> {
        self.store.delete(&self.container, &marker_key(key)).await
    }

    async fn scan(&self) -> StorageResult<(Vec<StagedObject>, Vec<StrayMarker>)> {
        let objects = self.store.list_objects(&self.container).await?;

        let mut markers: HashMap<String, Option<DateTime<Utc>>> = HashMap::new();
        let mut staged = Vec::new();
        for object in objects {
            if let Some(target) = object.key.strip_suffix(ANNOUNCE_MARKER_SUFFIX) {
                markers.insert(target.to_string(), object.last_modified);
                continue;
            }
            match StagingKey::parse(&object.key) {
                Ok(key) => staged.push(StagedObject {
                    key,
                    size: object.size,
                    last_modified: object.last_modified,
                    announced: false,
                }),
                Err(e) => {
                    tracing::warn!(
                        container = %self.container,
                        key = %object.key,
                        error = %e,
                        "Ignoring unrecognised object in staging container"
                    );
                }
            }
        }

        for object in &mut staged {
            if let Some(marked) = markers.remove(&object.key.object_key()) {
                object.announced = match (marked, object.last_modified) {
                    (Some(marked), Some(modified)) => marked >= modified,
                    _ => true,
                };
            }
        }

        let mut strays: Vec<StrayMarker> = markers
            .into_iter()
            .filter_map(|(target, last_modified)| {
                StagingKey::parse(&target)
                    .ok()
                    .map(|key| StrayMarker { key, last_modified })
            })
            .collect();
        strays.sort_by_key(|m| m.key.object_key());

        Ok((staged, strays))
    }

    /// Staged objects belonging to one tenant.
    pub async fn list_for_tenant(&self, tenant: TenantId) -> StorageResult<Vec<StagedObject>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|o| o.key.tenant_id() == tenant)
            .collect())
    }
}

/// MIME type stored with staged and migrated objects.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharespace_storage::{InMemoryObjectStore, StorageError};

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[tokio::test]
    async fn ensure_container_is_idempotent() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let staging = StagingStore::new(store.clone(), "sharespace-staging", "jpg");

        staging.ensure_container().await.unwrap();
        staging.ensure_container().await.unwrap();
        assert_eq!(store.container_names(), vec!["sharespace-staging"]);
        assert_eq!(store.create_attempts().len(), 1);
    }

    #[tokio::test]
    async fn ensure_container_reports_foreign_owner() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        store.reserve_foreign_name("sharespace-staging");
        let staging = StagingStore::new(store, "sharespace-staging", "jpg");

        assert!(matches!(
            staging.ensure_container().await,
            Err(StorageError::ContainerNameTaken(_))
        ));
    }

    #[tokio::test]
    async fn reupload_overwrites_same_key() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let staging = StagingStore::new(store.clone(), "sharespace-staging", "jpg");
        staging.ensure_container().await.unwrap();

        let first = staging
            .put(TenantId(7), PostId(42), Bytes::from_static(b"one"))
            .await
            .unwrap();
        let second = staging
            .put(TenantId(7), PostId(42), Bytes::from_static(b"two"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.object_keys("sharespace-staging"), vec!["7-42.jpg"]);
        assert_eq!(
            store.content_type("sharespace-staging", "7-42.jpg").as_deref(),
            Some("image/jpeg")
        );
    }

    #[tokio::test]
    async fn list_skips_foreign_keys_and_filters_by_tenant() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let staging = StagingStore::new(store.clone(), "sharespace-staging", "jpg");
        staging.ensure_container().await.unwrap();
        staging
            .put(TenantId(7), PostId(1), Bytes::from_static(b"a"))
            .await
            .unwrap();
        staging
            .put(TenantId(70), PostId(1), Bytes::from_static(b"b"))
            .await
            .unwrap();
        store
            .put(
                "sharespace-staging",
                "readme.txt",
                Bytes::from_static(b"?"),
                "text/plain",
            )
            .await
            .unwrap();

        assert_eq!(staging.list().await.unwrap().len(), 2);
        let mine = staging.list_for_tenant(TenantId(7)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].key.object_key(), "7-1.jpg");
    }

    #[tokio::test]
    async fn marker_covers_only_earlier_writes() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let staging = StagingStore::new(store.clone(), "sharespace-staging", "jpg");
        staging.ensure_container().await.unwrap();

        let key = staging
            .put(TenantId(7), PostId(42), Bytes::from_static(b"one"))
            .await
            .unwrap();
        assert!(!staging.list().await.unwrap()[0].announced);

        staging.mark_announced(&key).await.unwrap();
        let listed = staging.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].announced);

        staging
            .put(TenantId(7), PostId(42), Bytes::from_static(b"two"))
            .await
            .unwrap();
        assert!(!staging.list().await.unwrap()[0].announced);

        staging.delete(&key).await.unwrap();
        assert!(store.object_keys("sharespace-staging").is_empty());
    }

    #[tokio::test]
    async fn markers_without_upload_are_reported_as_strays() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let staging = StagingStore::new(store.clone(), "sharespace-staging", "jpg");
        staging.ensure_container().await.unwrap();

        let key = staging.key(TenantId(7), PostId(42));
        staging.mark_announced(&key).await.unwrap();

        assert!(staging.list().await.unwrap().is_empty());
        let strays = staging.stray_markers().await.unwrap();
        assert_eq!(strays.len(), 1);
        assert_eq!(strays[0].key, key);

        staging.delete_marker(&key).await.unwrap();
        assert!(staging.stray_markers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_if_unchanged_keeps_newer_upload() {
        let store = Arc::new(InMemoryObjectStore::new(SECRET));
        let staging = StagingStore::new(store.clone(), "sharespace-staging", "jpg");
        staging.ensure_container().await.unwrap();

        let key = staging
            .put(TenantId(7), PostId(42), Bytes::from_static(b"one"))
            .await
            .unwrap();
        let version = staging.head(&key).await.unwrap().unwrap();
        staging
            .put(TenantId(7), PostId(42), Bytes::from_static(b"one"))
            .await
            .unwrap();

        assert!(!staging.delete_if_unchanged(&key, &version).await.unwrap());
        assert_eq!(store.object_keys("sharespace-staging"), vec!["7-42.jpg"]);

        let version = staging.head(&key).await.unwrap().unwrap();
        assert!(staging.delete_if_unchanged(&key, &version).await.unwrap());
        assert!(store.object_keys("sharespace-staging").is_empty());
    }
}
