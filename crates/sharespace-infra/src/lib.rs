//! Sharespace Infrastructure Library
//!
//! Process-wide plumbing shared by the sharespace binaries. Currently only
//! tracing initialisation.

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};
