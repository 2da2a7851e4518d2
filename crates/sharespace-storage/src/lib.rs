//! Sharespace Storage Library
//!
//! Container-aware object storage abstraction used by the media pipeline, with
//! S3, local filesystem and in-memory implementations.
//!
//! # Containers
//!
//! A container is a bucket in the provider's namespace. On S3 that namespace is
//! global across all accounts, so `create_container` can fail with
//! [`StorageError::ContainerNameTaken`] for a name nobody in this application
//! owns. Creating a container the caller already owns succeeds.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod signing;
pub mod traits;

// Re-export commonly used types
pub use factory::create_object_store;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::InMemoryObjectStore;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use sharespace_core::StorageBackend;
pub use signing::UrlSigner;
pub use traits::{ContainerInfo, ObjectInfo, ObjectStore, StorageError, StorageResult};
