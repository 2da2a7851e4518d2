use crate::signing::UrlSigner;
use crate::traits::{
    validate_container_name, validate_key, ContainerInfo, ObjectInfo, ObjectStore, StorageError,
    StorageResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Each container is a directory directly under `base_path` and each object a
/// file inside it. Object keys are flat. Read URLs are HMAC-signed and resolved
/// with [`LocalStorage::open_signed_url`].
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    signer: UrlSigner,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for containers (e.g., "/var/lib/sharespace/media")
    /// * `base_url` - Base URL for serving signed reads (e.g., "http://localhost:3000/media")
    /// * `url_signing_secret` - HMAC key for read URLs
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: String,
        url_signing_secret: &str,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            signer: UrlSigner::new(url_signing_secret, base_url),
        })
    }

    fn container_path(&self, container: &str) -> StorageResult<PathBuf> {
        validate_container_name(container)?;
        Ok(self.base_path.join(container))
    }

    /// Convert container and key to a filesystem path with security validation
    fn object_path(&self, container: &str, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key.contains('/') {
            return Err(StorageError::InvalidKey(
                "Local storage keys cannot contain '/'".to_string(),
            ));
        }
        Ok(self.container_path(container)?.join(key))
    }

    async fn require_container(&self, container: &str) -> StorageResult<PathBuf> {
        let path = self.container_path(container)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::ContainerNotFound(container.to_string()));
        }
        Ok(path)
    }

    /// Read the object a signed URL points to, after checking signature and expiry.
    pub async fn open_signed_url(&self, url: &str) -> StorageResult<Bytes> {
        let (container, key) = self.signer.verify(url)?;
        self.get(&container, &key).await
    }
}

fn system_time_to_utc(time: std::io::Result<std::time::SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut containers = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let created_at = system_time_to_utc(metadata.created())
                .or_else(|| system_time_to_utc(metadata.modified()));
            containers.push(ContainerInfo { name, created_at });
        }

        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn create_container(&self, name: &str) -> StorageResult<()> {
        let path = self.container_path(name)?;
        match fs::create_dir(&path).await {
            Ok(()) => {
                tracing::info!(container = %name, path = %path.display(), "Local container created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StorageError::BackendError(format!(
                "Failed to create container {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        let path = self.require_container(name).await?;
        let mut entries = fs::read_dir(&path).await?;
        if entries.next_entry().await?.is_some() {
            return Err(StorageError::ContainerNotEmpty(name.to_string()));
        }

        fs::remove_dir(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!(
                "Failed to delete container {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!(container = %name, "Local container deleted");
        Ok(())
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        self.require_container(container).await?;
        let path = self.object_path(container, key)?;
        let size = data.len();
        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            container = %container,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(())
    }

    async fn get(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        self.require_container(container).await?;
        let path = self.object_path(container, key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(format!(
                "Failed to read file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> StorageResult<()> {
        self.require_container(from_container).await?;
        self.require_container(to_container).await?;
        let from_path = self.object_path(from_container, from_key)?;
        let to_path = self.object_path(to_container, to_key)?;

        if !fs::try_exists(&from_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(from_key.to_string()));
        }

        fs::copy(&from_path, &to_path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to copy {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from_path = %from_path.display(),
            to_path = %to_path.display(),
            "Local storage copy successful"
        );

        Ok(())
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        self.require_container(container).await?;
        let path = self.object_path(container, key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        self.require_container(container).await?;
        let path = self.object_path(container, key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn head(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        self.require_container(container).await?;
        let path = self.object_path(container, key)?;
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: metadata.len(),
                last_modified: system_time_to_utc(metadata.modified()),
                etag: None,
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, container: &str) -> StorageResult<Vec<ObjectInfo>> {
        let path = self.require_container(container).await?;
        let mut entries = fs::read_dir(&path).await?;
        let mut objects = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Ok(key) = entry.file_name().into_string() else {
                continue;
            };
            objects.push(ObjectInfo {
                key,
                size: metadata.len(),
                last_modified: system_time_to_utc(metadata.modified()),
                etag: None,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn presigned_get_url(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.object_path(container, key)?;
        Ok(self.signer.sign(container, key, expires_in))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
