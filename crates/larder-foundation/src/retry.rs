//! Retry policy with backoff and jitter
//!
//! A [`RetryPolicy`] is a pure delay schedule: given an attempt number it
//! returns how long to wait before that attempt runs. The orchestrator owns
//! the loop; this type owns only the arithmetic.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay schedule for retry attempts.
///
/// One instance per `Orchestrator::run` call; immutable once constructed.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use larder_foundation::RetryPolicy;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_base_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first (0 = no retry).
    pub max_retries: u32,
    /// Nominal delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Double the delay on every attempt when set.
    pub exponential: bool,
    /// Randomize each delay down to between 50% and 100% of nominal.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential: true,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the nominal first-retry delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enable or disable exponential growth.
    pub fn with_exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Compute the delay before attempt `attempt` (1-indexed).
    ///
    /// Exponential: `min(base_delay * 2^attempt, max_delay)`. Jitter
    /// multiplies the nominal delay by a uniform draw from `[0.5, 1.0)`, so
    /// it only ever shortens the wait, by at most half.
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = if self.exponential {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(20)))
                .min(self.max_delay)
        } else {
            self.base_delay
        };

        if self.jitter {
            nominal.mul_f64(rand::thread_rng().gen_range(0.5..1.0))
        } else {
            nominal
        }
    }
}
