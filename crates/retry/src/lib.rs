//! Policy-driven retry execution for MSX services.
//!
//! Wraps a fallible operation with bounded re-attempts, a configurable
//! linear or geometric backoff, and a distinction between transient and
//! permanent failures. Sleeps between attempts go through a [`Clock`] so they
//! can be cancelled by the surrounding scope and driven deterministically in
//! tests.
//!
//! # Feature Tiers
//!
//! - `foundation`: failure classification, backoff math, configuration
//! - `runtime` (default): async executor, clocks, decorators, tracing
//! - `test-utils`: exposes [`testing`] to downstream crates

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod config;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod resilience;
#[cfg(feature = "foundation")]
pub mod utils;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use config::{RetryConfig, RetryConfigBuilder, DEFAULT_CONFIG_ROOT};
#[cfg(feature = "foundation")]
pub use error::{ConfigError, ConfigResult};
#[cfg(feature = "foundation")]
pub use resilience::{
    classify, AnyFailure, Backoff, BoxError, Classification, Failure, FailureError, FailureExt,
    PermanentError, TransientError, Unclassified,
};
#[cfg(feature = "runtime")]
pub use resilience::{
    mark_permanent, mark_transient, retry, retry_action, sleep_until_cancelled, Cancelled, Clock,
    RetryError, RetryExecutor, RetryOutcome, RetryResult, SystemClock, WaitId,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
