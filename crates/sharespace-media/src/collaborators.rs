//! Narrow views of the share/space subsystem, which owns users, posts and
//! membership. The media pipeline only ever asks these questions.

use async_trait::async_trait;
use sharespace_core::{PostId, TenantId, UserId};

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether `user` created `post`.
    async fn is_owner(&self, user: UserId, post: PostId) -> bool;

    /// Whether `user` belongs to `tenant`.
    async fn is_tenant_member(&self, user: UserId, tenant: TenantId) -> bool;
}

#[async_trait]
pub trait PostDirectory: Send + Sync {
    /// Tenant a post was published in, `None` for an unknown post.
    async fn tenant_of(&self, post: PostId) -> Option<TenantId>;
}

/// Stand-in for operator tooling running without the application database.
/// Knows no posts and grants nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

#[async_trait]
impl Authorizer for Detached {
    async fn is_owner(&self, _user: UserId, _post: PostId) -> bool {
        false
    }

    async fn is_tenant_member(&self, _user: UserId, _tenant: TenantId) -> bool {
        false
    }
}

#[async_trait]
impl PostDirectory for Detached {
    async fn tenant_of(&self, _post: PostId) -> Option<TenantId> {
        None
    }
}
