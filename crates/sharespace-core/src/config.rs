//! Configuration module
//!
//! Environment-driven configuration for the storage backend, the migration
//! queue, the worker pool and the media pipeline itself.

use std::env;

use crate::constants::{
    DEFAULT_CONTAINER_PREFIX, DEFAULT_MEDIA_EXTENSION, DEFAULT_PROVISION_MAX_ATTEMPTS,
    DEFAULT_SIGNED_URL_EXPIRY_SECS, DEFAULT_STAGING_CONTAINER, MAX_CONTAINER_NAME_LEN,
};
use crate::storage_types::{QueueBackend, StorageBackend};

const QUEUE_WAIT_TIME_SECS: u64 = 20;
const QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 30;
const QUEUE_MAX_RECEIVE_COUNT: u32 = 5;
const WORKER_MAX_CONCURRENCY: usize = 4;
const WORKER_BATCH_SIZE: u32 = 10;
const RECONCILE_INTERVAL_SECS: u64 = 300;
const STAGING_ORPHAN_GRACE_SECS: u64 = 600;
const MIN_SIGNING_SECRET_LEN: usize = 32;

/// Object storage settings
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// HMAC secret for URLs signed by the local and in-memory backends.
    pub url_signing_secret: Option<String>,
}

/// Migration queue settings
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub sqs_queue_url: Option<String>,
    pub sqs_message_group_id: String,
    pub wait_time_secs: u64,
    pub visibility_timeout_secs: u64,
    pub max_receive_count: u32,
}

/// Media pipeline settings
#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub staging_container: String,
    pub container_prefix: String,
    pub extension: String,
    pub signed_url_expiry_secs: u64,
    pub provision_max_attempts: u32,
}

/// Worker pool settings
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub max_concurrency: usize,
    pub batch_size: u32,
    /// 0 disables the periodic reconciliation sweep.
    pub reconcile_interval_secs: u64,
    pub staging_orphan_grace_secs: u64,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub log_format: String,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub media: MediaConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(s) => s.parse::<StorageBackend>()?,
            Err(_) => StorageBackend::S3,
        };

        let queue_backend = match env::var("QUEUE_BACKEND") {
            Ok(s) => s.parse::<QueueBackend>()?,
            Err(_) => QueueBackend::Sqs,
        };

        let storage = StorageConfig {
            backend: storage_backend,
            s3_region: env::var("S3_REGION").ok().filter(|s| !s.is_empty()),
            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            aws_region: env::var("AWS_REGION").ok().filter(|s| !s.is_empty()),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL").ok(),
            url_signing_secret: env::var("URL_SIGNING_SECRET").ok(),
        };

        let queue = QueueConfig {
            backend: queue_backend,
            sqs_queue_url: env::var("SQS_QUEUE_URL").ok().filter(|s| !s.is_empty()),
            sqs_message_group_id: env::var("SQS_MESSAGE_GROUP_ID")
                .unwrap_or_else(|_| "media".to_string()),
            wait_time_secs: env::var("QUEUE_WAIT_TIME_SECS")
                .unwrap_or_else(|_| QUEUE_WAIT_TIME_SECS.to_string())
                .parse()
                .unwrap_or(QUEUE_WAIT_TIME_SECS),
            visibility_timeout_secs: env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
                .unwrap_or_else(|_| QUEUE_VISIBILITY_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(QUEUE_VISIBILITY_TIMEOUT_SECS),
            max_receive_count: env::var("QUEUE_MAX_RECEIVE_COUNT")
                .unwrap_or_else(|_| QUEUE_MAX_RECEIVE_COUNT.to_string())
                .parse()
                .unwrap_or(QUEUE_MAX_RECEIVE_COUNT),
        };

        let media = MediaConfig {
            staging_container: env::var("STAGING_CONTAINER")
                .unwrap_or_else(|_| DEFAULT_STAGING_CONTAINER.to_string()),
            container_prefix: env::var("CONTAINER_PREFIX")
                .unwrap_or_else(|_| DEFAULT_CONTAINER_PREFIX.to_string())
                .trim_end_matches('-')
                .to_string(),
            extension: env::var("MEDIA_EXTENSION")
                .unwrap_or_else(|_| DEFAULT_MEDIA_EXTENSION.to_string())
                .trim_start_matches('.')
                .to_lowercase(),
            signed_url_expiry_secs: env::var("SIGNED_URL_EXPIRY_SECS")
                .unwrap_or_else(|_| DEFAULT_SIGNED_URL_EXPIRY_SECS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SIGNED_URL_EXPIRY_SECS must be a valid number"))?,
            provision_max_attempts: env::var("PROVISION_MAX_ATTEMPTS")
                .unwrap_or_else(|_| DEFAULT_PROVISION_MAX_ATTEMPTS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PROVISION_MAX_ATTEMPTS must be a valid number"))?,
        };

        let worker = WorkerConfig {
            max_concurrency: env::var("WORKER_MAX_CONCURRENCY")
                .unwrap_or_else(|_| WORKER_MAX_CONCURRENCY.to_string())
                .parse()
                .unwrap_or(WORKER_MAX_CONCURRENCY),
            batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| WORKER_BATCH_SIZE.to_string())
                .parse()
                .unwrap_or(WORKER_BATCH_SIZE),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| RECONCILE_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(RECONCILE_INTERVAL_SECS),
            staging_orphan_grace_secs: env::var("STAGING_ORPHAN_GRACE_SECS")
                .unwrap_or_else(|_| STAGING_ORPHAN_GRACE_SECS.to_string())
                .parse()
                .unwrap_or(STAGING_ORPHAN_GRACE_SECS),
        };

        let config = Config {
            environment,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase(),
            storage,
            queue,
            media,
            worker,
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration with in-memory backends, used by tests and local runs.
    pub fn in_memory(url_signing_secret: impl Into<String>) -> Self {
        Config {
            environment: "development".to_string(),
            log_format: "pretty".to_string(),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                s3_region: None,
                s3_endpoint: None,
                aws_region: None,
                local_storage_path: None,
                local_storage_base_url: None,
                url_signing_secret: Some(url_signing_secret.into()),
            },
            queue: QueueConfig {
                backend: QueueBackend::Memory,
                sqs_queue_url: None,
                sqs_message_group_id: "media".to_string(),
                wait_time_secs: 0,
                visibility_timeout_secs: QUEUE_VISIBILITY_TIMEOUT_SECS,
                max_receive_count: QUEUE_MAX_RECEIVE_COUNT,
            },
            media: MediaConfig {
                staging_container: DEFAULT_STAGING_CONTAINER.to_string(),
                container_prefix: DEFAULT_CONTAINER_PREFIX.to_string(),
                extension: DEFAULT_MEDIA_EXTENSION.to_string(),
                signed_url_expiry_secs: DEFAULT_SIGNED_URL_EXPIRY_SECS,
                provision_max_attempts: DEFAULT_PROVISION_MAX_ATTEMPTS,
            },
            worker: WorkerConfig {
                max_concurrency: WORKER_MAX_CONCURRENCY,
                batch_size: WORKER_BATCH_SIZE,
                reconcile_interval_secs: 0,
                staging_orphan_grace_secs: STAGING_ORPHAN_GRACE_SECS,
            },
        }
    }

    /// Region for S3 clients, preferring S3_REGION over AWS_REGION.
    pub fn s3_region(&self) -> Option<&str> {
        self.storage
            .s3_region
            .as_deref()
            .or(self.storage.aws_region.as_deref())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage.backend {
            StorageBackend::S3 => {
                if self.s3_region().is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
                self.validate_signing_secret()?;
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "memory storage backend cannot be used in production"
                    ));
                }
                self.validate_signing_secret()?;
            }
        }

        match self.queue.backend {
            QueueBackend::Sqs => {
                if self.queue.sqs_queue_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "SQS_QUEUE_URL must be set when using SQS queue backend"
                    ));
                }
            }
            QueueBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "memory queue backend cannot be used in production"
                    ));
                }
            }
        }

        if self.queue.wait_time_secs > 20 {
            return Err(anyhow::anyhow!(
                "QUEUE_WAIT_TIME_SECS must be between 0 and 20"
            ));
        }

        if self.queue.max_receive_count == 0 {
            return Err(anyhow::anyhow!("QUEUE_MAX_RECEIVE_COUNT must be at least 1"));
        }

        if self.media.signed_url_expiry_secs == 0 || self.media.signed_url_expiry_secs > 59 {
            return Err(anyhow::anyhow!(
                "SIGNED_URL_EXPIRY_SECS must be between 1 and 59 seconds"
            ));
        }

        if self.media.provision_max_attempts == 0 {
            return Err(anyhow::anyhow!("PROVISION_MAX_ATTEMPTS must be at least 1"));
        }

        if self.media.container_prefix.is_empty()
            || !self
                .media
                .container_prefix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(anyhow::anyhow!(
                "CONTAINER_PREFIX must contain only lowercase letters, digits and '-'"
            ));
        }

        // prefix + '-' + i64 tenant id + '-' + 5 digit suffix
        if self.media.container_prefix.len() + 1 + 19 + 1 + 5 > MAX_CONTAINER_NAME_LEN {
            return Err(anyhow::anyhow!(
                "CONTAINER_PREFIX is too long for a {} character container name",
                MAX_CONTAINER_NAME_LEN
            ));
        }

        if self.media.extension.is_empty()
            || !self.media.extension.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(anyhow::anyhow!("MEDIA_EXTENSION must be alphanumeric"));
        }

        if self.worker.max_concurrency == 0 {
            return Err(anyhow::anyhow!("WORKER_MAX_CONCURRENCY must be at least 1"));
        }

        if self.worker.batch_size == 0 || self.worker.batch_size > 10 {
            return Err(anyhow::anyhow!("WORKER_BATCH_SIZE must be between 1 and 10"));
        }

        Ok(())
    }

    fn validate_signing_secret(&self) -> Result<(), anyhow::Error> {
        match self.storage.url_signing_secret.as_deref() {
            Some(secret) if secret.len() >= MIN_SIGNING_SECRET_LEN => Ok(()),
            Some(_) => Err(anyhow::anyhow!(
                "URL_SIGNING_SECRET must be at least {} characters long",
                MIN_SIGNING_SECRET_LEN
            )),
            None => Err(anyhow::anyhow!(
                "URL_SIGNING_SECRET must be set for the {} storage backend",
                self.storage.backend
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn in_memory_config_is_valid() {
        Config::in_memory(SECRET).validate().unwrap();
    }

    #[test]
    fn short_signing_secret_rejected() {
        let config = Config::in_memory("short");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("URL_SIGNING_SECRET"));
    }

    #[test]
    fn memory_backends_rejected_in_production() {
        let mut config = Config::in_memory(SECRET);
        config.environment = "production".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn signed_url_expiry_must_stay_short() {
        let mut config = Config::in_memory(SECRET);
        config.media.signed_url_expiry_secs = 3600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn container_prefix_must_be_bucket_safe() {
        let mut config = Config::in_memory(SECRET);
        config.media.container_prefix = "Tenant_ID".to_string();
        assert!(config.validate().is_err());

        config.media.container_prefix = "a".repeat(40);
        assert!(config.validate().is_err());
    }

    #[test]
    fn sqs_requires_queue_url() {
        let mut config = Config::in_memory(SECRET);
        config.queue.backend = QueueBackend::Sqs;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SQS_QUEUE_URL"));
    }

    #[test]
    fn s3_region_falls_back_to_aws_region() {
        let mut config = Config::in_memory(SECRET);
        config.storage.aws_region = Some("eu-west-1".to_string());
        assert_eq!(config.s3_region(), Some("eu-west-1"));
        config.storage.s3_region = Some("us-east-2".to_string());
        assert_eq!(config.s3_region(), Some("us-east-2"));
    }
}
