//! Configuration errors
//!
//! Errors raised while building or loading a [`RetryConfig`]. Failures of the
//! retried operation itself are never converted into these; they travel
//! through [`RetryError`] untouched.
//!
//! [`RetryConfig`]: crate::config::RetryConfig
//! [`RetryError`]: crate::resilience::RetryError

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while validating or loading retry configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is outside its accepted range
    #[error("Invalid retry configuration: {message}")]
    Invalid { message: String },

    /// The configuration document could not be parsed
    #[error("Invalid {format} format: {message}")]
    Parse { format: &'static str, message: String },

    /// The configuration file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension does not map to a supported format
    #[error("Unsupported config format: {extension}")]
    UnsupportedFormat { extension: String },
}

impl ConfigError {
    /// Create an [`ConfigError::Invalid`] error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }

    /// Create a [`ConfigError::Parse`] error for the given format
    pub fn parse(format: &'static str, message: impl ToString) -> Self {
        Self::Parse { format, message: message.to_string() }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
