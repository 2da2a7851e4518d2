pub mod ids;
pub mod media;

pub use ids::{PostId, TenantId, UserId};
pub use media::{ContainerRef, KeyError, MediaObjectKey, MigrationNotification, StagingKey};
