//! Config loading, validation, and accessors.

use super::model::LockConfig;
use crate::error::{LockError, Result};
use std::path::Path;
use std::time::Duration;

impl LockConfig {
    /// Create a config with the given timeout and the default poll interval.
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }

    /// Replace the poll interval.
    pub fn poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(LockConfig)` - Successfully loaded and validated config
    /// * `Err(LockError::UserError)` - Read error, parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: LockConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `timeout_ms` must be positive
    /// - `poll_interval_ms` must be positive and not exceed `timeout_ms`
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(LockError::UserError(
                "config validation failed: timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(LockError::UserError(
                "config validation failed: poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms > self.timeout_ms {
            return Err(LockError::UserError(format!(
                "config validation failed: poll_interval_ms ({}) must not exceed timeout_ms ({})",
                self.poll_interval_ms, self.timeout_ms
            )));
        }

        Ok(())
    }

    /// The stale-holder timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The wait-loop poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
