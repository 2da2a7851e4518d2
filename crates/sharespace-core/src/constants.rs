//! Wire-compatible defaults for the media pipeline.

/// Extension every staged and migrated image carries.
pub const DEFAULT_MEDIA_EXTENSION: &str = "jpg";

/// Stable prefix of tenant container names: `{prefix}-{tenant_id}-{suffix}`.
pub const DEFAULT_CONTAINER_PREFIX: &str = "tenant-id";

/// Shared container every upload lands in before migration.
pub const DEFAULT_STAGING_CONTAINER: &str = "sharespace-staging";

/// Signed URLs are meant to be fetched immediately, never cached.
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 3;

/// Upper bound on container creation attempts before provisioning gives up.
pub const DEFAULT_PROVISION_MAX_ATTEMPTS: u32 = 20;

/// Inclusive range of the random container name disambiguator.
pub const CONTAINER_SUFFIX_MIN: u32 = 10_000;
pub const CONTAINER_SUFFIX_MAX: u32 = 99_999;

/// Bucket names on S3 are limited to 63 characters.
pub const MAX_CONTAINER_NAME_LEN: usize = 63;
