//! Engine configuration
//!
//! Every field has a default, so a YAML document only needs the keys it
//! wants to override:
//!
//! ```yaml
//! max_parallel_adapters: 8
//! adapter_timeout_seconds: 600
//! retry_failed_adapters: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backoff stops growing after this many doublings
const MAX_BACKOFF_DOUBLINGS: i32 = 16;

/// Errors loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Settings for one orchestration engine instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Size of the admission gate
    pub max_parallel_adapters: usize,
    /// Hard deadline per adapter attempt
    pub adapter_timeout_seconds: f64,

    pub enable_deduplication: bool,
    pub enable_cross_platform_correlation: bool,
    pub enable_resource_monitoring: bool,
    pub resource_sample_interval_seconds: f64,

    /// Tasks are refused while process memory is above this
    pub max_memory_usage_mb: f64,
    /// Tasks are briefly delayed while host CPU is above this
    pub max_cpu_usage_percent: f64,
    /// Tasks are refused while free disk is below this
    pub min_disk_space_mb: f64,
    pub cpu_throttle_pause_ms: u64,

    /// Minimum similarity score for two assets to be merged
    pub asset_similarity_threshold: f64,
    /// Minimum pair similarity for a network correlation to be reported.
    ///
    /// A shared primary IP alone scores 0.4, so the default reports every
    /// cross-platform pair on the same address. Raising it above 0.4 drops
    /// pairs that agree on nothing but the IP.
    pub correlation_confidence_threshold: f64,

    pub retry_failed_adapters: bool,
    /// Extra attempts after the first one
    pub retry_attempts: u32,
    /// Base backoff, doubled after each failed attempt
    pub retry_delay_seconds: f64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_parallel_adapters: 5,
            adapter_timeout_seconds: 1800.0,
            enable_deduplication: true,
            enable_cross_platform_correlation: true,
            enable_resource_monitoring: true,
            resource_sample_interval_seconds: 5.0,
            max_memory_usage_mb: 2048.0,
            max_cpu_usage_percent: 80.0,
            min_disk_space_mb: 1024.0,
            cpu_throttle_pause_ms: 1000,
            asset_similarity_threshold: 0.8,
            correlation_confidence_threshold: 0.4,
            retry_failed_adapters: false,
            retry_attempts: 2,
            retry_delay_seconds: 5.0,
        }
    }
}

impl OrchestrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn with_max_parallel_adapters(mut self, limit: usize) -> Self {
        self.max_parallel_adapters = limit;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout_seconds = timeout.as_secs_f64();
        self
    }

    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.enable_deduplication = enabled;
        self
    }

    pub fn with_correlation(mut self, enabled: bool) -> Self {
        self.enable_cross_platform_correlation = enabled;
        self
    }

    pub fn with_resource_monitoring(mut self, enabled: bool) -> Self {
        self.enable_resource_monitoring = enabled;
        self
    }

    pub fn with_resource_limits(mut self, memory_mb: f64, cpu_percent: f64, min_disk_mb: f64) -> Self {
        self.max_memory_usage_mb = memory_mb;
        self.max_cpu_usage_percent = cpu_percent;
        self.min_disk_space_mb = min_disk_mb;
        self
    }

    pub fn with_cpu_throttle_pause(mut self, pause: Duration) -> Self {
        self.cpu_throttle_pause_ms = pause.as_millis() as u64;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.asset_similarity_threshold = threshold;
        self
    }

    /// Enable retries: `attempts` extra tries with `delay` base backoff
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_failed_adapters = true;
        self.retry_attempts = attempts;
        self.retry_delay_seconds = delay.as_secs_f64();
        self
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.adapter_timeout_seconds)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(self.resource_sample_interval_seconds)
    }

    pub fn cpu_throttle_pause(&self) -> Duration {
        Duration::from_millis(self.cpu_throttle_pause_ms)
    }

    /// Total attempts allowed per task, including the first
    pub fn max_attempts(&self) -> u32 {
        if self.retry_failed_adapters {
            self.retry_attempts.saturating_add(1)
        } else {
            1
        }
    }

    /// Backoff before attempt `attempt + 1`, given `attempt` already failed
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let doublings = (attempt.saturating_sub(1) as i32).min(MAX_BACKOFF_DOUBLINGS);
        let factor = 2f64.powi(doublings);
        Duration::from_secs_f64(self.retry_delay_seconds * factor)
    }

    /// Reject values that would stall or panic the engine
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_adapters == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_adapters must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("adapter_timeout_seconds", self.adapter_timeout_seconds),
            (
                "resource_sample_interval_seconds",
                self.resource_sample_interval_seconds,
            ),
        ] {
            if representable(name, value)?.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.retry_delay_seconds < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "retry_delay_seconds must be non-negative, got {}",
                self.retry_delay_seconds
            )));
        }
        // The longest backoff retry_delay() can produce must fit too
        representable(
            "retry_delay_seconds",
            self.retry_delay_seconds * 2f64.powi(MAX_BACKOFF_DOUBLINGS),
        )?;
        for (name, value) in [
            ("asset_similarity_threshold", self.asset_similarity_threshold),
            (
                "correlation_confidence_threshold",
                self.correlation_confidence_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// `value` seconds as a `Duration`, or an error naming the field
fn representable(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::Invalid(format!(
            "{} must be a finite, non-negative number of seconds that fits a duration, got {}",
            name, value
        ))
    })
}
