//! Engine configuration
//!
//! Defaults for the reliability engine, loadable from an optional
//! `larder.{toml,yaml,json}` file with `LARDER_*` environment overrides.
//! Flat scalar fields keep the file format and the env mapping obvious.

use std::time::Duration;

use ::config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryPolicy;

/// Tunables for retries, circuit breaking and bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Default retry budget per execution.
    pub max_retries: u32,
    /// Nominal first-retry delay, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on any retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Exponential backoff growth.
    pub exponential_backoff: bool,
    /// Jitter retry delays down to 50-100% of nominal.
    pub retry_jitter: bool,
    /// Consecutive failures before a breaker opens.
    pub failure_threshold: u32,
    /// Seconds an open breaker waits before probing.
    pub reset_timeout_secs: u64,
    /// Probes admitted while half-open.
    pub half_open_max_calls: u32,
    /// Gate executions through circuit breakers.
    pub circuit_breaker_enabled: bool,
    /// Completed executions retained for reporting.
    pub max_history: usize,
    /// History entries per agent considered by health reports.
    pub health_window: usize,
    /// Default per-attempt timeout, in seconds (none = unbounded).
    pub default_timeout_secs: Option<u64>,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_backoff: true,
            retry_jitter: true,
            failure_threshold: 5,
            reset_timeout_secs: 30,
            half_open_max_calls: 3,
            circuit_breaker_enabled: true,
            max_history: 1_000,
            health_window: 100,
            default_timeout_secs: None,
        }
    }
}

impl ReliabilityConfig {
    /// Load from `larder.{toml,yaml,json}` (optional) and `LARDER_*` env
    /// variables, falling back to defaults for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("larder").required(false))
            .add_source(Environment::with_prefix("LARDER"))
            .build()?
            .try_deserialize()
    }

    /// The retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            exponential: self.exponential_backoff,
            jitter: self.retry_jitter,
        }
    }

    /// The breaker template these settings describe.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
            half_open_max_calls: self.half_open_max_calls,
            enabled: self.circuit_breaker_enabled,
        }
    }

    /// Default attempt bound, if configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}
