//! Sharespace Core Library
//!
//! Domain identifiers, media models, configuration and error types shared by
//! every sharespace crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    ContainerRef, KeyError, MediaObjectKey, MigrationNotification, PostId, StagingKey, TenantId,
    UserId,
};
pub use storage_types::{QueueBackend, StorageBackend};
