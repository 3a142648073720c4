//! Shared helpers
//!
//! - **[`serde`]**: serde adapters for configuration values

pub mod serde;

pub use self::serde::duration_millis;
