//! Retry configuration
//!
//! [`RetryConfig`] is the value object every executor is built from. It can
//! be assembled in code through [`RetryConfigBuilder`] or read from a section
//! of a TOML or JSON document addressed by a dotted root path:
//!
//! ```toml
//! [spring.retry]
//! attempts = 5
//! delay = 250      # milliseconds
//! backoff = 2.0
//! linear = false
//! ```
//!
//! Missing keys fall back to the defaults (3 attempts, 500ms, no backoff,
//! linear); a missing section yields the defaults outright.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::utils::serde::duration_millis;

/// Root under which service configuration keeps the default retry section
pub const DEFAULT_CONFIG_ROOT: &str = "spring.retry";

/// Default maximum number of invocations
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default base delay between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Default backoff factor (constant delay)
pub const DEFAULT_BACKOFF: f64 = 0.0;

/// Default growth mode
pub const DEFAULT_LINEAR: bool = true;

/// Configuration for a retry session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of invocations; the first attempt counts as one
    pub attempts: u32,
    /// Base wait between attempts
    #[serde(with = "duration_millis")]
    pub delay: Duration,
    /// Growth factor; `0.0` keeps the delay constant
    pub backoff: f64,
    /// Arithmetic growth when `true`, geometric when `false`
    pub linear: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
            backoff: DEFAULT_BACKOFF,
            linear: DEFAULT_LINEAR,
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder starting from the defaults
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// `attempts == 0` passes: an executor handed such a configuration runs
    /// nothing and reports it, rather than the loader refusing to start.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.backoff.is_finite() || self.backoff < 0.0 {
            return Err(ConfigError::invalid(format!(
                "backoff must be a finite, non-negative number, got {}",
                self.backoff
            )));
        }

        Ok(())
    }

    /// Read the section at `root` from a TOML document
    pub fn from_toml_str(contents: &str, root: &str) -> ConfigResult<Self> {
        let table: toml::Table =
            toml::from_str(contents).map_err(|e| ConfigError::parse("TOML", e))?;
        let document = toml::Value::Table(table);

        let config = match lookup_toml(&document, root) {
            Some(section) => {
                section.clone().try_into::<Self>().map_err(|e| ConfigError::parse("TOML", e))?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Read the section at `root` from a JSON document
    pub fn from_json_str(contents: &str, root: &str) -> ConfigResult<Self> {
        let document: serde_json::Value =
            serde_json::from_str(contents).map_err(|e| ConfigError::parse("JSON", e))?;

        let config = match lookup_json(&document, root) {
            Some(section) => serde_json::from_value::<Self>(section.clone())
                .map_err(|e| ConfigError::parse("JSON", e))?,
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Read the section at `root` from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>, root: &str) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
            "toml" => Self::from_toml_str(&contents, root),
            "json" => Self::from_json_str(&contents, root),
            other => Err(ConfigError::UnsupportedFormat { extension: other.to_string() }),
        }
    }
}

fn segments(root: &str) -> impl Iterator<Item = &str> {
    root.split('.').filter(|segment| !segment.is_empty())
}

fn lookup_toml<'a>(document: &'a toml::Value, root: &str) -> Option<&'a toml::Value> {
    segments(root).try_fold(document, |value, segment| value.get(segment))
}

fn lookup_json<'a>(document: &'a serde_json::Value, root: &str) -> Option<&'a serde_json::Value> {
    segments(root).try_fold(document, |value, segment| value.get(segment))
}

/// Builder for [`RetryConfig`] with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of invocations
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.config.attempts = attempts;
        self
    }

    /// Base wait between attempts
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Growth factor
    pub fn backoff(mut self, backoff: f64) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Arithmetic growth: each retry adds `delay * backoff`
    pub fn linear(mut self) -> Self {
        self.config.linear = true;
        self
    }

    /// Geometric growth: each retry multiplies the delay by `backoff`
    pub fn geometric(mut self) -> Self {
        self.config.linear = false;
        self
    }

    /// Validate and build; unlike deserialization, zero attempts is refused
    pub fn build(self) -> ConfigResult<RetryConfig> {
        if self.config.attempts == 0 {
            return Err(ConfigError::invalid("attempts must be greater than 0"));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
