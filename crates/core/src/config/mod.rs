//! Resilience configuration per operation class
//!
//! An [`EngineConfig`] holds a default [`ResilienceConfig`] plus optional
//! overrides keyed by operation class. Durations serialize as milliseconds:
//!
//! ```toml
//! [default.retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//!
//! [classes.convert.worker]
//! operation_timeout_ms = 120000
//! ```

use std::collections::HashMap;
use std::time::Duration;

use docrecover_common::duration_millis;
use docrecover_common::resilience::{CircuitBreakerConfig, ConfigError, ConfigResult, RetryPolicy};
use serde::{Deserialize, Serialize};

pub mod loader;

pub use loader::{
    apply_env_overrides, apply_overrides_from, load, load_from_file, load_from_str, ConfigFormat,
    LoadError,
};

/// Breaker thresholds for one operation class
pub type CircuitBreakerSettings = CircuitBreakerConfig;

/// Operation class names used by the built-in degradation mapping
pub mod classes {
    pub const CONVERT: &str = "convert";
    pub const FETCH_PAGES: &str = "fetch-pages";
    pub const FETCH_DOCUMENT: &str = "fetch-document";
    pub const STORAGE: &str = "storage";
    pub const RENDER: &str = "render";
}

/// Limits for the rendering worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerRecoveryConfig {
    pub pool_size: usize,
    /// Consecutive replacements allowed before the supervisor gives up
    pub max_restarts: u32,
    #[serde(with = "duration_millis", rename = "operation_timeout_ms")]
    pub operation_timeout: Duration,
    #[serde(with = "duration_millis", rename = "ping_timeout_ms")]
    pub ping_timeout: Duration,
    #[serde(with = "duration_millis", rename = "health_check_interval_ms")]
    pub health_check_interval: Duration,
}

impl Default for WorkerRecoveryConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            max_restarts: 3,
            operation_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

impl WorkerRecoveryConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool_size == 0 {
            return Err(ConfigError::invalid("worker pool_size must be greater than 0"));
        }
        if self.operation_timeout.is_zero() || self.ping_timeout.is_zero() {
            return Err(ConfigError::invalid("worker timeouts must be greater than 0"));
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::invalid("health_check_interval must be greater than 0"));
        }
        Ok(())
    }
}

/// Complete resilience profile for one operation class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerSettings,
    pub worker: WorkerRecoveryConfig,
    pub enable_graceful_degradation: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self::default_profile()
    }
}

impl ResilienceConfig {
    /// Profile for short network-bound operations
    pub fn default_profile() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            worker: WorkerRecoveryConfig::default(),
            enable_graceful_degradation: true,
        }
    }

    /// More lenient profile for conversions that legitimately take minutes
    pub fn long_running_conversion() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(120),
                backoff_multiplier: 1.5,
                jitter_enabled: true,
            },
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 8,
                success_threshold: 2,
                timeout: Duration::from_secs(120),
                half_open_max_calls: 1,
            },
            worker: WorkerRecoveryConfig {
                pool_size: 2,
                max_restarts: 5,
                operation_timeout: Duration::from_secs(120),
                ping_timeout: Duration::from_secs(10),
                health_check_interval: Duration::from_secs(60),
            },
            enable_graceful_degradation: true,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.worker.validate()
    }
}

/// Default profile plus per-class overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default: ResilienceConfig,
    pub classes: HashMap<String, ResilienceConfig>,
}

impl EngineConfig {
    pub fn new(default: ResilienceConfig) -> Self {
        Self { default, classes: HashMap::new() }
    }

    /// Default profile, with conversions on the long-running profile
    pub fn recommended() -> Self {
        Self::default()
            .with_class(classes::CONVERT, ResilienceConfig::long_running_conversion())
    }

    pub fn with_class(mut self, class: impl Into<String>, config: ResilienceConfig) -> Self {
        self.classes.insert(class.into(), config);
        self
    }

    pub fn for_class(&self, class: &str) -> &ResilienceConfig {
        self.classes.get(class).unwrap_or(&self.default)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.default.validate()?;
        for (class, config) in &self.classes {
            config.validate().map_err(|e| ConfigError::invalid(format!("class '{class}': {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(ResilienceConfig::default_profile().validate().is_ok());
        assert!(ResilienceConfig::long_running_conversion().validate().is_ok());
        assert!(EngineConfig::recommended().validate().is_ok());
    }

    #[test]
    fn test_long_running_is_more_lenient() {
        let default = ResilienceConfig::default_profile();
        let long = ResilienceConfig::long_running_conversion();
        assert!(long.retry.max_attempts > default.retry.max_attempts);
        assert!(long.retry.max_delay > default.retry.max_delay);
        assert!(long.circuit_breaker.failure_threshold > default.circuit_breaker.failure_threshold);
        assert!(long.worker.operation_timeout > default.worker.operation_timeout);
    }

    #[test]
    fn test_for_class_falls_back_to_default() {
        let config = EngineConfig::recommended();
        assert_eq!(config.for_class(classes::CONVERT).retry.max_attempts, 5);
        assert_eq!(config.for_class("fetch-pages"), &config.default);
    }

    #[test]
    fn test_invalid_class_is_named_in_error() {
        let mut broken = ResilienceConfig::default_profile();
        broken.worker.pool_size = 0;
        let config = EngineConfig::default().with_class("render", broken);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("class 'render'"));
    }
}
