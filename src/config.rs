//! Client configuration and validation.
//!
//! Settings come from defaults, an optional TOML file, and environment
//! variables, in increasing order of precedence. Command-line flags are
//! applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Base URL of the deployment backend when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Interval between status polls when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Environment variable overriding the backend base URL.
pub const ENV_API_URL: &str = "DEPLOY_WIZARD_API_URL";

/// Environment variable overriding the poll interval (seconds).
pub const ENV_POLL_INTERVAL: &str = "DEPLOY_WIZARD_POLL_INTERVAL_SECS";

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Settings for talking to the deployment backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    pub api_url: String,

    /// Seconds between status polls.
    pub poll_interval_secs: u64,

    /// Optional per-request timeout in seconds. Unset means no timeout.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// Parses a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Loads defaults, then the file (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration file");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Applies environment overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a whole number of seconds", ENV_POLL_INTERVAL))
            })?;
        }
        Ok(self)
    }

    /// Sets the base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the poll interval in seconds.
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let url = self.api_url.trim();
        if url.is_empty() {
            result.add_error("api_url cannot be empty");
        } else if !url.starts_with("http://") && !url.starts_with("https://") {
            result.add_error(format!("api_url '{}' must start with http:// or https://", url));
        }

        if self.poll_interval_secs == 0 {
            result.add_error("poll_interval_secs must be at least 1");
        }

        if self.request_timeout_secs == Some(0) {
            result.add_error("request_timeout_secs must be at least 1 when set");
        }

        if let Some(timeout) = self.request_timeout_secs {
            if timeout > 0 && timeout < self.poll_interval_secs {
                result.add_warning(
                    "request_timeout_secs shorter than the poll interval may drop slow status updates",
                );
            }
        }

        result
    }
}
