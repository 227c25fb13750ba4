//! Shutter Infrastructure Library
//!
//! This crate provides shared infrastructure used by the upload pipeline:
//! - Telemetry initialization
//! - Concurrency limiting (compression and transfer admission)
//! - Retry with exponential backoff and jitter

pub mod limiter;
pub mod retry;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

// Re-export commonly used types
pub use limiter::{ConcurrencyLimiter, LimiterClosed, LimiterPermit};
pub use retry::{RetryAttempt, RetryController, RetryPolicy};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry};
