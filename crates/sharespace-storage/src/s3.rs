use crate::traits::{
    validate_container_name, ContainerInfo, ObjectInfo, ObjectStore, StorageError, StorageResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// S3 storage implementation
///
/// Containers map to buckets. Bucket names are global across all AWS accounts,
/// which is why `create_container` distinguishes a name owned by someone else
/// from one this account already owns.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    region: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            // S3-compatible providers need path-style addressing
            let mut s3_config_builder = aws_sdk_s3::Config::builder()
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config)
                .force_path_style(true);
            if let Some(provider) = config.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
            Client::from_conf(s3_config_builder.build())
        } else {
            Client::new(&config)
        };

        Ok(S3Storage { client, region })
    }

    /// Build from an already configured client.
    pub fn from_client(client: Client, region: String) -> Self {
        S3Storage { client, region }
    }
}

fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let output = self.client.list_buckets().send().await.map_err(|e| {
            tracing::error!(error = %e, "S3 list buckets failed");
            StorageError::BackendError(e.to_string())
        })?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                bucket.name().map(|name| ContainerInfo {
                    name: name.to_string(),
                    created_at: bucket.creation_date().and_then(to_utc),
                })
            })
            .collect())
    }

    async fn create_container(&self, name: &str) -> StorageResult<()> {
        validate_container_name(name)?;
        let start = std::time::Instant::now();

        let mut request = self.client.create_bucket().bucket(name);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(
                    bucket = %name,
                    region = %self.region,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 bucket created"
                );
                Ok(())
            }
            Err(SdkError::ServiceError(service_err)) => match service_err.err() {
                CreateBucketError::BucketAlreadyOwnedByYou(_) => {
                    tracing::debug!(bucket = %name, "S3 bucket already owned by this account");
                    Ok(())
                }
                CreateBucketError::BucketAlreadyExists(_) => {
                    tracing::debug!(bucket = %name, "S3 bucket name taken");
                    Err(StorageError::ContainerNameTaken(name.to_string()))
                }
                other => {
                    tracing::error!(error = %other, bucket = %name, "S3 create bucket failed");
                    Err(StorageError::BackendError(other.to_string()))
                }
            },
            Err(e) => {
                tracing::error!(error = %e, bucket = %name, "S3 create bucket failed");
                Err(StorageError::BackendError(e.to_string()))
            }
        }
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        self.client
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("BucketNotEmpty") => StorageError::ContainerNotEmpty(name.to_string()),
                Some("NoSuchBucket") => StorageError::ContainerNotFound(name.to_string()),
                _ => {
                    tracing::error!(error = %e, bucket = %name, "S3 delete bucket failed");
                    StorageError::DeleteFailed(e.to_string())
                }
            })?;

        tracing::info!(bucket = %name, "S3 bucket deleted");
        Ok(())
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %container,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                match e.code() {
                    Some("NoSuchBucket") => StorageError::ContainerNotFound(container.to_string()),
                    _ => StorageError::UploadFailed(e.to_string()),
                }
            })?;

        tracing::info!(
            bucket = %container,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn get(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err)
                    if matches!(service_err.err(), GetObjectError::NoSuchKey(_)) =>
                {
                    StorageError::NotFound(key.to_string())
                }
                _ => {
                    tracing::error!(
                        error = %e,
                        bucket = %container,
                        key = %key,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 download failed"
                    );
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();

        // URL-encode the copy source per AWS S3 API requirements
        let copy_source = format!("{}/{}", from_container, urlencoding::encode(from_key));

        self.client
            .copy_object()
            .bucket(to_container)
            .copy_source(&copy_source)
            .key(to_key)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("NoSuchKey") => StorageError::NotFound(from_key.to_string()),
                Some("NoSuchBucket") => StorageError::ContainerNotFound(format!(
                    "{} or {}",
                    from_container, to_container
                )),
                _ => {
                    tracing::error!(
                        error = %e,
                        copy_source = %copy_source,
                        bucket = %to_container,
                        key = %to_key,
                        "S3 copy failed"
                    );
                    StorageError::BackendError(e.to_string())
                }
            })?;

        tracing::info!(
            from_bucket = %from_container,
            from_key = %from_key,
            to_bucket = %to_container,
            to_key = %to_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        Ok(())
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();

        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %container,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        tracing::debug!(
            bucket = %container,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(false),
                    _ => Err(StorageError::BackendError(e.to_string())),
                },
                _ => Err(StorageError::BackendError(e.to_string())),
            },
        }
    }

    async fn head(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        match self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: output.last_modified().and_then(to_utc),
                etag: output.e_tag().map(str::to_string),
            })),
            Err(e) => match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    HeadObjectError::NotFound(_) => Ok(None),
                    _ => Err(StorageError::BackendError(e.to_string())),
                },
                _ => Err(StorageError::BackendError(e.to_string())),
            },
        }
    }

    async fn list_objects(&self, container: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(container)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| match e.code() {
                    Some("NoSuchBucket") => StorageError::ContainerNotFound(container.to_string()),
                    _ => {
                        tracing::error!(error = %e, bucket = %container, "S3 list objects failed");
                        StorageError::BackendError(e.to_string())
                    }
                })?;

            objects.extend(output.contents().iter().filter_map(|object| {
                object.key().map(|key| ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_utc),
                    etag: object.e_tag().map(str::to_string),
                })
            }));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn presigned_get_url(
        &self,
        container: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presigning_config = aws_sdk_s3::presigning::PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?;

        Ok(presigned_request.uri().to_string())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
