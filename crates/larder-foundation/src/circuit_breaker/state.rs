//! Circuit Breaker State Machine
//!
//! Three states:
//! - Closed: normal operation, requests are allowed
//! - Open: requests are rejected until the reset timeout elapses
//! - Half-Open: a bounded number of probe requests test recovery
//!
//! The breaker is a plain struct: its owner (the execution manager) holds it
//! behind a single lock, so no interior synchronization is needed here.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::CircuitBreakerConfig;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - requests are allowed
    Closed,
    /// Requests are rejected
    Open,
    /// Testing recovery - limited requests allowed
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used for the breaker-state gauge.
    pub fn as_gauge(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-agent circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    half_open_calls: u32,
}

impl CircuitBreaker {
    /// Create a fresh breaker in the Closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            half_open_calls: 0,
        }
    }

    /// Whether a new attempt may proceed right now.
    ///
    /// An open breaker whose reset timeout has elapsed transitions to
    /// half-open and admits the call. Half-open admissions are counted
    /// against `half_open_max_calls`.
    pub fn can_execute(&mut self) -> bool {
        if !self.config.enabled {
            return true;
        }

        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let reset_elapsed = self
                    .last_failure_at
                    .map(|at| at.elapsed() > self.config.reset_timeout)
                    .unwrap_or(true);
                if reset_elapsed {
                    debug!(state = %self.state, "circuit breaker probing recovery");
                    self.state = CircuitState::HalfOpen;
                    // this probe is the first half-open admission
                    self.half_open_calls = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_calls < self.config.half_open_max_calls {
                    self.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful execution.
    pub fn record_success(&mut self) {
        if !self.config.enabled {
            return;
        }

        let was_half_open = self.state == CircuitState::HalfOpen;
        if was_half_open {
            debug!("circuit breaker recovered, closing");
            self.state = CircuitState::Closed;
        }
        self.failure_count = 0;
        if was_half_open {
            self.half_open_calls += 1;
        }
    }

    /// Record a failed execution.
    pub fn record_failure(&mut self) {
        if !self.config.enabled {
            return;
        }

        self.failure_count += 1;
        self.last_failure_at = Some(Instant::now());

        let should_open = self.state == CircuitState::HalfOpen
            || self.failure_count >= self.config.failure_threshold;
        if should_open && self.state != CircuitState::Open {
            warn!(failures = self.failure_count, "circuit breaker opened");
            self.state = CircuitState::Open;
        }
    }

    /// Current state, without the open-to-half-open timeout check.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// The configuration this breaker runs with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Serializable view for dashboards and debug endpoints.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            half_open_calls: self.half_open_calls,
            seconds_since_last_failure: self.last_failure_at.map(|at| at.elapsed().as_secs_f64()),
            enabled: self.config.enabled,
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_calls: u32,
    pub seconds_since_last_failure: Option<f64>,
    pub enabled: bool,
}
