//! Circuit Breaker Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit waits before probing recovery.
    pub reset_timeout: Duration,
    /// Maximum calls admitted while half-open.
    pub half_open_max_calls: u32,
    /// Whether the breaker gates executions at all.
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            enabled: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Set the half-open admission cap.
    pub fn with_half_open_max_calls(mut self, max: u32) -> Self {
        self.half_open_max_calls = max;
        self
    }

    /// Enable or disable the breaker.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Strict configuration: opens quickly, probes cautiously.
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(10),
            half_open_max_calls: 1,
            enabled: true,
        }
    }

    /// Lenient configuration: tolerates many failures before opening.
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 5,
            enabled: true,
        }
    }

    /// Disabled configuration: never gates executions.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}
