//! Configuration loader
//!
//! Loads an [`EngineConfig`] from a TOML or JSON file and applies environment
//! overrides on top.
//!
//! ## Environment Variables
//! Overrides apply to the default profile and to every class override.
//! - `DOCRECOVER_MAX_ATTEMPTS`: retry budget per call
//! - `DOCRECOVER_BASE_DELAY_MS`: first backoff delay in milliseconds
//! - `DOCRECOVER_MAX_DELAY_MS`: backoff cap in milliseconds
//! - `DOCRECOVER_JITTER`: whether jitter is added (true/false)
//! - `DOCRECOVER_FAILURE_THRESHOLD`: consecutive failures that open a breaker
//! - `DOCRECOVER_BREAKER_TIMEOUT_MS`: open-state cooldown in milliseconds
//! - `DOCRECOVER_MAX_RESTARTS`: worker replacements before giving up
//! - `DOCRECOVER_DEGRADATION`: whether graceful degradation is enabled

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use docrecover_common::resilience::ConfigError;
use thiserror::Error;

use super::{EngineConfig, ResilienceConfig};

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML format: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Serialized configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(LoadError::UnsupportedFormat(other.unwrap_or("<none>").to_string())),
        }
    }
}

/// Parse and validate configuration from string content
pub fn load_from_str(contents: &str, format: ConfigFormat) -> Result<EngineConfig, LoadError> {
    let config: EngineConfig = match format {
        ConfigFormat::Toml => toml::from_str(contents)?,
        ConfigFormat::Json => serde_json::from_str(contents)?,
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file; the format follows the extension
pub fn load_from_file(path: impl AsRef<Path>) -> Result<EngineConfig, LoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let format = ConfigFormat::from_path(path)?;
    tracing::info!(path = %path.display(), "Loading resilience configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    load_from_str(&contents, format)
}

/// Load from an optional file, then apply environment overrides
///
/// Without a file the built-in defaults are used.
pub fn load(path: Option<&Path>) -> Result<EngineConfig, LoadError> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => EngineConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Apply `DOCRECOVER_*` overrides from the process environment
pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), LoadError> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides from any key lookup, then re-validate
pub fn apply_overrides_from<F>(config: &mut EngineConfig, lookup: F) -> Result<(), LoadError>
where
    F: Fn(&str) -> Option<String>,
{
    let overrides = Overrides::read(&lookup)?;
    if overrides.is_empty() {
        return Ok(());
    }

    overrides.apply(&mut config.default);
    for profile in config.classes.values_mut() {
        overrides.apply(profile);
    }

    tracing::debug!(?overrides, "Applied environment overrides");
    config.validate()?;
    Ok(())
}

#[derive(Debug, Default)]
struct Overrides {
    max_attempts: Option<u32>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    jitter: Option<bool>,
    failure_threshold: Option<u64>,
    breaker_timeout: Option<Duration>,
    max_restarts: Option<u32>,
    degradation: Option<bool>,
}

impl Overrides {
    fn read<F: Fn(&str) -> Option<String>>(lookup: &F) -> Result<Self, LoadError> {
        Ok(Self {
            max_attempts: parse_var(lookup, "DOCRECOVER_MAX_ATTEMPTS")?,
            base_delay: parse_var(lookup, "DOCRECOVER_BASE_DELAY_MS")?.map(Duration::from_millis),
            max_delay: parse_var(lookup, "DOCRECOVER_MAX_DELAY_MS")?.map(Duration::from_millis),
            jitter: bool_var(lookup, "DOCRECOVER_JITTER")?,
            failure_threshold: parse_var(lookup, "DOCRECOVER_FAILURE_THRESHOLD")?,
            breaker_timeout: parse_var(lookup, "DOCRECOVER_BREAKER_TIMEOUT_MS")?
                .map(Duration::from_millis),
            max_restarts: parse_var(lookup, "DOCRECOVER_MAX_RESTARTS")?,
            degradation: bool_var(lookup, "DOCRECOVER_DEGRADATION")?,
        })
    }

    fn is_empty(&self) -> bool {
        self.max_attempts.is_none()
            && self.base_delay.is_none()
            && self.max_delay.is_none()
            && self.jitter.is_none()
            && self.failure_threshold.is_none()
            && self.breaker_timeout.is_none()
            && self.max_restarts.is_none()
            && self.degradation.is_none()
    }

    fn apply(&self, profile: &mut ResilienceConfig) {
        if let Some(value) = self.max_attempts {
            profile.retry.max_attempts = value;
        }
        if let Some(value) = self.base_delay {
            profile.retry.base_delay = value;
        }
        if let Some(value) = self.max_delay {
            profile.retry.max_delay = value;
        }
        if let Some(value) = self.jitter {
            profile.retry.jitter_enabled = value;
        }
        if let Some(value) = self.failure_threshold {
            profile.circuit_breaker.failure_threshold = value;
        }
        if let Some(value) = self.breaker_timeout {
            profile.circuit_breaker.timeout = value;
        }
        if let Some(value) = self.max_restarts {
            profile.worker.max_restarts = value;
        }
        if let Some(value) = self.degradation {
            profile.enable_graceful_degradation = value;
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, LoadError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| LoadError::InvalidEnv { key: key.to_string(), value: raw }),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn bool_var<F>(lookup: &F, key: &str) -> Result<Option<bool>, LoadError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(LoadError::InvalidEnv { key: key.to_string(), value: raw }),
        },
    }
}
