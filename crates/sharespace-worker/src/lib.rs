//! Sharespace Worker Library
//!
//! Queue consumer that migrates staged uploads into tenant containers, plus
//! the periodic reconciliation service.

pub mod error;
pub mod pool;
pub mod reconciler;

pub use error::MigrationError;
pub use pool::{BatchReport, MigrationWorkerPool, WorkerPoolConfig, RECEIVE_ERROR_BACKOFF};
pub use reconciler::ReconcileService;
