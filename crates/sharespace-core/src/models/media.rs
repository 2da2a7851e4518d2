//! Media pipeline models: staging keys, tenant containers, migrated objects and
//! the notification handed from the upload path to the migration worker.
//!
//! Key formats are wire-compatible with existing buckets:
//!
//! - staging object: `{tenant_id}-{post_id}.{ext}`
//! - migrated object: `{post_id}.{ext}` inside the tenant container
//! - tenant container: `{prefix}-{tenant_id}-{suffix}`

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PostId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Malformed object key: {0}")]
    Malformed(String),
}

fn parse_id(raw: &str, key: &str) -> Result<i64, KeyError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::Malformed(key.to_string()));
    }
    raw.parse::<i64>()
        .map_err(|_| KeyError::Malformed(key.to_string()))
}

fn split_extension(key: &str) -> Result<(&str, &str), KeyError> {
    match key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Ok((stem, ext)),
        _ => Err(KeyError::Malformed(key.to_string())),
    }
}

/// Key of a post's image inside the shared staging container.
///
/// At most one staged object exists per post: a re-upload writes the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    tenant_id: TenantId,
    post_id: PostId,
    extension: String,
}

impl StagingKey {
    pub fn new(tenant_id: TenantId, post_id: PostId, extension: impl Into<String>) -> Self {
        Self {
            tenant_id,
            post_id,
            extension: extension.into(),
        }
    }

    /// Parse a staging object key such as `7-42.jpg`.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let (stem, extension) = split_extension(key)?;
        let (tenant, post) = stem
            .split_once('-')
            .ok_or_else(|| KeyError::Malformed(key.to_string()))?;
        Ok(Self {
            tenant_id: TenantId(parse_id(tenant, key)?),
            post_id: PostId(parse_id(post, key)?),
            extension: extension.to_string(),
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn object_key(&self) -> String {
        format!("{}-{}.{}", self.tenant_id, self.post_id, self.extension)
    }

    /// Key the object is migrated to inside the tenant container.
    pub fn media_key(&self) -> MediaObjectKey {
        MediaObjectKey::new(self.post_id, self.extension.clone())
    }

    pub fn notification(&self) -> MigrationNotification {
        MigrationNotification::new(self.tenant_id, self.post_id)
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.tenant_id, self.post_id, self.extension)
    }
}

/// Key of a migrated image inside its tenant container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaObjectKey {
    post_id: PostId,
    extension: String,
}

impl MediaObjectKey {
    pub fn new(post_id: PostId, extension: impl Into<String>) -> Self {
        Self {
            post_id,
            extension: extension.into(),
        }
    }

    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let (stem, extension) = split_extension(key)?;
        Ok(Self {
            post_id: PostId(parse_id(stem, key)?),
            extension: extension.to_string(),
        })
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn object_key(&self) -> String {
        format!("{}.{}", self.post_id, self.extension)
    }
}

impl fmt::Display for MediaObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.post_id, self.extension)
    }
}

/// Name of a tenant's dedicated storage container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRef(String);

impl ContainerRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn into_name(self) -> String {
        self.0
    }
}

impl AsRef<str> for ContainerRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request to migrate one post's staged image into its tenant container.
///
/// Every delivery mechanism (explicit queue payload, storage event, legacy
/// plain key) is translated into this type before it reaches the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationNotification {
    pub tenant_id: TenantId,
    pub post_id: PostId,
}

impl MigrationNotification {
    pub fn new(tenant_id: TenantId, post_id: PostId) -> Self {
        Self { tenant_id, post_id }
    }

    pub fn staging_key(&self, extension: &str) -> StagingKey {
        StagingKey::new(self.tenant_id, self.post_id, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_key_formats_tenant_then_post() {
        let key = StagingKey::new(TenantId(7), PostId(42), "jpg");
        assert_eq!(key.object_key(), "7-42.jpg");
        assert_eq!(key.to_string(), "7-42.jpg");
        assert_eq!(key.media_key().object_key(), "42.jpg");
    }

    #[test]
    fn staging_key_parses_back() {
        let key = StagingKey::parse("7-42.jpg").unwrap();
        assert_eq!(key.tenant_id(), TenantId(7));
        assert_eq!(key.post_id(), PostId(42));
        assert_eq!(key.extension(), "jpg");
        assert_eq!(
            key.notification(),
            MigrationNotification::new(TenantId(7), PostId(42))
        );
    }

    #[test]
    fn staging_key_rejects_malformed_keys() {
        for bad in ["7-42", "742.jpg", "-7-42.jpg", "a-42.jpg", "7-.jpg", ".jpg", "7-42."] {
            assert!(StagingKey::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn media_key_parses_post_id() {
        let key = MediaObjectKey::parse("42.jpg").unwrap();
        assert_eq!(key.post_id(), PostId(42));
        assert!(MediaObjectKey::parse("7-42.jpg").is_err());
    }

    #[test]
    fn notification_serializes_as_plain_ids() {
        let n = MigrationNotification::new(TenantId(7), PostId(42));
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, r#"{"tenant_id":7,"post_id":42}"#);
        let back: MigrationNotification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}
