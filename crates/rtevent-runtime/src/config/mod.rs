//! Runtime configuration
//!
//! Compile-time defaults overridden by environment variables.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. Builder calls
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use rtevent_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//!
//! let config = RuntimeConfig::from_env()
//!     .max_sleep_slice(Duration::from_millis(250));
//! ```

pub mod defaults;

use std::time::Duration;
use rtevent_core::env::env_get;

/// Runtime-wide tunables for the calibration loop and the delay engine.
///
/// Use `from_env()` to start with compile-time defaults and apply any
/// environment variable overrides.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum single sleep slice in the delay engine (bounds limit/cancel
    /// check latency). Default 500ms per the delay engine's design.
    pub max_sleep_slice: Duration,

    /// Minimum adaptive interval between calibration cycles.
    pub calibration_min_interval: Duration,

    /// Maximum adaptive interval between calibration cycles.
    pub calibration_max_interval: Duration,

    /// Sleep slices at or below this duration skip the post-sleep
    /// limit/cancel recheck to save a clock read.
    pub recheck_skip_threshold: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Build from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `RTEVENT_MAX_SLEEP_SLICE_MS`
    /// - `RTEVENT_CALIBRATION_MIN_INTERVAL_MS`
    /// - `RTEVENT_CALIBRATION_MAX_INTERVAL_MS`
    /// - `RTEVENT_RECHECK_SKIP_THRESHOLD_MS`
    pub fn from_env() -> Self {
        Self {
            max_sleep_slice: Duration::from_millis(env_get(
                "RTEVENT_MAX_SLEEP_SLICE_MS",
                defaults::MAX_SLEEP_SLICE_MS,
            )),
            calibration_min_interval: Duration::from_millis(env_get(
                "RTEVENT_CALIBRATION_MIN_INTERVAL_MS",
                defaults::CALIBRATION_MIN_INTERVAL_MS,
            )),
            calibration_max_interval: Duration::from_millis(env_get(
                "RTEVENT_CALIBRATION_MAX_INTERVAL_MS",
                defaults::CALIBRATION_MAX_INTERVAL_MS,
            )),
            recheck_skip_threshold: Duration::from_millis(env_get(
                "RTEVENT_RECHECK_SKIP_THRESHOLD_MS",
                defaults::RECHECK_SKIP_THRESHOLD_MS,
            )),
        }
    }

    /// Compile-time defaults with no environment override. Used by tests
    /// that want deterministic config regardless of the ambient environment.
    pub fn new() -> Self {
        Self {
            max_sleep_slice: Duration::from_millis(defaults::MAX_SLEEP_SLICE_MS),
            calibration_min_interval: Duration::from_millis(defaults::CALIBRATION_MIN_INTERVAL_MS),
            calibration_max_interval: Duration::from_millis(defaults::CALIBRATION_MAX_INTERVAL_MS),
            recheck_skip_threshold: Duration::from_millis(defaults::RECHECK_SKIP_THRESHOLD_MS),
        }
    }

    pub fn max_sleep_slice(mut self, d: Duration) -> Self {
        self.max_sleep_slice = d;
        self
    }

    pub fn calibration_interval_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.calibration_min_interval = min;
        self.calibration_max_interval = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sleep_slice.is_zero() {
            return Err(ConfigError::InvalidValue("max_sleep_slice must be > 0"));
        }
        if self.calibration_min_interval > self.calibration_max_interval {
            return Err(ConfigError::InvalidValue(
                "calibration_min_interval must be <= calibration_max_interval",
            ));
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_defaults_valid() {
        let config = RuntimeConfig::from_env();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new().max_sleep_slice(Duration::from_millis(250));
        assert_eq!(config.max_sleep_slice, Duration::from_millis(250));
    }

    #[test]
    fn test_validation_rejects_inverted_bounds() {
        let config = RuntimeConfig::new()
            .calibration_interval_bounds(Duration::from_secs(10), Duration::from_secs(1));
        assert!(config.validate().is_err());
    }
}
