use crate::collaborators::{Authorizer, PostDirectory};
use crate::error::{MediaError, MediaResult};
use crate::staging::StagingStore;
use bytes::Bytes;
use sharespace_core::{PostId, StagingKey, TenantId, UserId};
use sharespace_queue::{encode_notification, MigrationQueue};
use std::sync::Arc;

/// Synchronous upload entry point.
///
/// Stages the bytes and schedules migration, then returns. Migration happens
/// later on a worker; until then the post has no readable media.
pub struct UploadGateway {
    authorizer: Arc<dyn Authorizer>,
    posts: Arc<dyn PostDirectory>,
    staging: Arc<StagingStore>,
    queue: Arc<dyn MigrationQueue>,
}

impl UploadGateway {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        posts: Arc<dyn PostDirectory>,
        staging: Arc<StagingStore>,
        queue: Arc<dyn MigrationQueue>,
    ) -> Self {
        Self {
            authorizer,
            posts,
            staging,
            queue,
        }
    }

    #[tracing::instrument(
        skip(self, data),
        fields(
            user_id = %user,
            tenant_id = %tenant,
            post_id = %post,
            size_bytes = data.len(),
        )
    )]
    pub async fn upload(
        &self,
        user: UserId,
        tenant: TenantId,
        post: PostId,
        data: Bytes,
    ) -> MediaResult<StagingKey> {
        if !self.authorizer.is_owner(user, post).await {
            return Err(MediaError::Forbidden(format!(
                "user {} does not own post {}",
                user, post
            )));
        }
        if self.posts.tenant_of(post).await != Some(tenant) {
            return Err(MediaError::Forbidden(format!(
                "post {} does not belong to space {}",
                post, tenant
            )));
        }

        let key = self.staging.put(tenant, post, data).await?;

        // The staged object is the source of truth from here on. A lost
        // notification is recovered by the reconciler's orphan sweep.
        match self
            .queue
            .publish(&encode_notification(&key.notification()))
            .await
        {
            Ok(message_id) => {
                tracing::info!(key = %key, message_id = %message_id, "Upload staged, migration scheduled");
                if let Err(e) = self.staging.mark_announced(&key).await {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Failed to record announced upload; the orphan sweep may publish it again"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Upload staged but migration notification failed; left for the orphan sweep"
                );
            }
        }

        Ok(key)
    }
}
