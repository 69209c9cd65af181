//! Tracing and logging setup shared by the service binaries.

/// Subscriber construction (filters, formats, file output).
pub mod tracing;

pub use self::tracing::{LogSettings, ObservabilityError, RunMode, init};
