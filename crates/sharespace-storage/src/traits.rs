//! Object storage abstraction trait
//!
//! This module defines the ObjectStore trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// The name is held by a container this application does not own.
    #[error("Container name already taken: {0}")]
    ContainerNameTaken(String),

    #[error("Container not empty: {0}")]
    ContainerNotEmpty(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid signed URL: {0}")]
    InvalidSignature(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Object or container absent. Callers in the media pipeline treat this as an
    /// expected state rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::ContainerNotFound(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A container as reported by the provider's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// An object as reported by a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Provider entity tag, when the backend has one.
    pub etag: Option<String>,
}

impl ObjectInfo {
    /// Whether both describe the same write of the same key.
    pub fn same_version(&self, other: &ObjectInfo) -> bool {
        self.key == other.key
            && self.size == other.size
            && self.last_modified == other.last_modified
            && self.etag == other.etag
    }
}

/// Container-aware object storage
///
/// Every pipeline component receives an `Arc<dyn ObjectStore>` from the process
/// entry point; no backend keeps global client state.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every container visible to this application, in provider order.
    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>>;

    /// Create a container.
    ///
    /// Returns `ContainerNameTaken` when the name belongs to someone else and
    /// `Ok(())` when the caller already owns a container with that name.
    async fn create_container(&self, name: &str) -> StorageResult<()>;

    /// Delete an empty container.
    async fn delete_container(&self, name: &str) -> StorageResult<()>;

    /// Write an object, overwriting any existing object with the same key.
    async fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Read a whole object.
    async fn get(&self, container: &str, key: &str) -> StorageResult<Bytes>;

    /// Server-side copy. Returns `NotFound` if the source object does not exist.
    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> StorageResult<()>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, container: &str, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool>;

    /// Metadata of a single object, `None` if it does not exist.
    async fn head(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>>;

    /// List every object of a container, following pagination.
    async fn list_objects(&self, container: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Generate a read-only URL for a single object that expires after `expires_in`.
    async fn presigned_get_url(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Reject keys that could escape a container on path-based backends.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Container names follow S3 bucket rules on every backend.
pub(crate) fn validate_container_name(name: &str) -> StorageResult<()> {
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    let valid_edges = name
        .bytes()
        .next()
        .zip(name.bytes().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);
    if !(3..=63).contains(&name.len()) || !valid_chars || !valid_edges || name.contains("..") {
        return Err(StorageError::InvalidKey(format!(
            "invalid container name: {}",
            name
        )));
    }
    Ok(())
}
