//! Testing utilities for the Larder reliability engine
//!
//! Scripted units of work with call counting, used by the integration tests
//! to drive the orchestrator deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A unit of work that fails a fixed number of times, then succeeds.
pub struct ScriptedWork {
    failures_before_success: usize,
    error_message: String,
    calls: AtomicUsize,
}

impl ScriptedWork {
    /// Fail `failures_before_success` times with `error_message`, then
    /// return the attempt index.
    pub fn new(failures_before_success: usize, error_message: impl Into<String>) -> Self {
        Self {
            failures_before_success,
            error_message: error_message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Work that always fails with `error_message`.
    pub fn always_failing(error_message: impl Into<String>) -> Self {
        Self::new(usize::MAX, error_message)
    }

    /// How many times the work has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Run one attempt.
    pub async fn attempt(&self) -> anyhow::Result<usize> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures_before_success {
            Err(anyhow::anyhow!("{}", self.error_message))
        } else {
            Ok(attempt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_work_fails_then_succeeds() {
        let work = ScriptedWork::new(2, "api 503");
        assert!(work.attempt().await.is_err());
        assert!(work.attempt().await.is_err());
        assert_eq!(work.attempt().await.unwrap(), 2);
        assert_eq!(work.calls(), 3);
    }
}
