//! Configuration for the model cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the model cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Seconds allowed for downloading one artifact bundle (default: 600).
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Seconds allowed for one loader attempt (default: 300).
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

fn default_fetch_timeout_secs() -> u64 {
    600 // 10 minutes
}

fn default_load_timeout_secs() -> u64 {
    300 // 5 minutes
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    /// Invalid fetch timeout (must be > 0).
    #[error("Invalid fetch timeout: must be greater than 0")]
    InvalidFetchTimeout,

    /// Invalid load timeout (must be > 0).
    #[error("Invalid load timeout: must be greater than 0")]
    InvalidLoadTimeout,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            load_timeout_secs: default_load_timeout_secs(),
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(CacheConfigError::InvalidFetchTimeout);
        }

        if self.load_timeout_secs == 0 {
            return Err(CacheConfigError::InvalidLoadTimeout);
        }

        Ok(())
    }

    /// Get the fetch timeout as a Duration.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Get the load timeout as a Duration.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}
