use crate::collaborators::{Authorizer, PostDirectory};
use crate::error::{MediaError, MediaResult};
use crate::naming::NamingResolver;
use crate::staging::StagingStore;
use sharespace_core::{MediaObjectKey, PostId, TenantId, UserId};
use sharespace_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// Read side of the pipeline: short-lived signed URLs for migrated media.
///
/// A post whose upload has not been migrated yet has no URL; callers see
/// `None` until the worker catches up.
pub struct MediaAccess {
    store: Arc<dyn ObjectStore>,
    naming: Arc<NamingResolver>,
    staging: Arc<StagingStore>,
    authorizer: Arc<dyn Authorizer>,
    posts: Arc<dyn PostDirectory>,
    url_expiry: Duration,
}

impl MediaAccess {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        naming: Arc<NamingResolver>,
        staging: Arc<StagingStore>,
        authorizer: Arc<dyn Authorizer>,
        posts: Arc<dyn PostDirectory>,
        url_expiry: Duration,
    ) -> Self {
        Self {
            store,
            naming,
            staging,
            authorizer,
            posts,
            url_expiry,
        }
    }

    fn media_key(&self, post: PostId) -> String {
        MediaObjectKey::new(post, self.staging.extension()).object_key()
    }

    /// Signed URL for a post's image, `None` while nothing has been migrated.
    #[tracing::instrument(skip(self), fields(post_id = %post))]
    pub async fn get_url(&self, post: PostId) -> MediaResult<Option<String>> {
        let tenant = self
            .posts
            .tenant_of(post)
            .await
            .ok_or(MediaError::PostNotFound(post))?;
        self.signed_url(tenant, post).await
    }

    /// [`MediaAccess::get_url`] restricted to members of the post's tenant.
    pub async fn get_url_as(&self, user: UserId, post: PostId) -> MediaResult<Option<String>> {
        let tenant = self
            .posts
            .tenant_of(post)
            .await
            .ok_or(MediaError::PostNotFound(post))?;
        self.require_member(user, tenant).await?;
        self.signed_url(tenant, post).await
    }

    /// One signed URL per object in the tenant's container, in listing order.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn list_all(&self, tenant: TenantId) -> MediaResult<Vec<String>> {
        let Some(container) = self.naming.resolve_existing(tenant).await? else {
            return Ok(Vec::new());
        };

        let objects = self.store.list_objects(container.name()).await?;
        let mut urls = Vec::with_capacity(objects.len());
        for object in objects {
            urls.push(
                self.store
                    .presigned_get_url(container.name(), &object.key, self.url_expiry)
                    .await?,
            );
        }
        tracing::debug!(container = %container, count = urls.len(), "Listed tenant media");
        Ok(urls)
    }

    /// [`MediaAccess::list_all`] restricted to members of the tenant.
    pub async fn list_all_as(&self, user: UserId, tenant: TenantId) -> MediaResult<Vec<String>> {
        self.require_member(user, tenant).await?;
        self.list_all(tenant).await
    }

    /// Remove a deleted post's media: the migrated object in every container of
    /// the tenant and any staged upload still waiting for migration.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant, post_id = %post))]
    pub async fn delete_media(&self, tenant: TenantId, post: PostId) -> MediaResult<()> {
        let key = self.media_key(post);
        for container in self.naming.find_all(tenant).await? {
            self.store.delete(&container.name, &key).await?;
        }
        self.staging.delete(&self.staging.key(tenant, post)).await?;
        tracing::info!(key = %key, "Post media deleted");
        Ok(())
    }

    async fn require_member(&self, user: UserId, tenant: TenantId) -> MediaResult<()> {
        if self.authorizer.is_tenant_member(user, tenant).await {
            Ok(())
        } else {
            Err(MediaError::Forbidden(format!(
                "user {} is not a member of space {}",
                user, tenant
            )))
        }
    }

    async fn signed_url(&self, tenant: TenantId, post: PostId) -> MediaResult<Option<String>> {
        let Some(container) = self.naming.resolve_existing(tenant).await? else {
            return Ok(None);
        };

        let key = self.media_key(post);
        if !self.store.exists(container.name(), &key).await? {
            return Ok(None);
        }

        let url = self
            .store
            .presigned_get_url(container.name(), &key, self.url_expiry)
            .await?;
        Ok(Some(url))
    }
}
