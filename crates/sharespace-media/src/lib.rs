//! Sharespace Media Library
//!
//! Tenant-scoped media storage: uploads land in a shared staging container,
//! a migration step moves each object into a container dedicated to its tenant,
//! and reads go through short-lived signed URLs.
//!
//! Components are plain structs holding `Arc`s to their dependencies. The
//! process entry point builds the object store and queue once and wires
//! everything through [`MediaPipeline::new`].

pub mod access;
pub mod collaborators;
pub mod error;
pub mod gateway;
pub mod migration;
pub mod naming;
pub mod pipeline;
pub mod provisioner;
pub mod reconcile;
pub mod staging;
pub mod teardown;

pub use access::MediaAccess;
pub use collaborators::{Authorizer, Detached, PostDirectory};
pub use error::{MediaError, MediaResult, ProvisionError};
pub use gateway::UploadGateway;
pub use migration::{MigrationOutcome, Migrator};
pub use naming::NamingResolver;
pub use pipeline::MediaPipeline;
pub use provisioner::{ContainerProvisioner, TenantLocks};
pub use reconcile::{MergeReport, Reconciler, SweepReport};
pub use staging::{StagedObject, StagingStore, StrayMarker};
pub use teardown::{TeardownReport, TenantTeardown};
