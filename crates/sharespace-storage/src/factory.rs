#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{InMemoryObjectStore, ObjectStore, StorageBackend, StorageError, StorageResult};
use sharespace_core::Config;
use std::sync::Arc;

/// Create an object store based on configuration
pub async fn create_object_store(config: &Config) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.storage.s3_endpoint.clone();

            let storage = S3Storage::new(region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.storage.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config
                .storage
                .local_storage_base_url
                .clone()
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
                })?;

            let storage = LocalStorage::new(base_path, base_url, signing_secret(config)?).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object store; objects are lost on exit");
            Ok(Arc::new(InMemoryObjectStore::new(signing_secret(config)?)))
        }
    }
}

fn signing_secret(config: &Config) -> StorageResult<&str> {
    config
        .storage
        .url_signing_secret
        .as_deref()
        .ok_or_else(|| StorageError::ConfigError("URL_SIGNING_SECRET not configured".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_from_config() {
        let config = Config::in_memory("test-secret-that-is-at-least-32-characters");
        let store = create_object_store(&config).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Memory);
    }

    #[tokio::test]
    async fn memory_backend_requires_secret() {
        let mut config = Config::in_memory("test-secret-that-is-at-least-32-characters");
        config.storage.url_signing_secret = None;
        assert!(matches!(
            create_object_store(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
