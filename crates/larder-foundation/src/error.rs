//! Execution error taxonomy
//!
//! Errors are grouped by origin, not by type name:
//! - [`ExecutionError::CircuitOpen`] - the breaker rejected the call before
//!   any context existed; never retried
//! - [`ExecutionError::Timeout`] - an attempt exceeded its bound; retried
//!   unless it was the final attempt
//! - [`ExecutionError::Task`] - whatever the unit of work raised, passed
//!   through transparently so the caller sees the original error once the
//!   retry budget is spent

use std::time::Duration;

use larder_kernel::AgentKind;

use crate::circuit_breaker::CircuitState;

/// Errors surfaced by the reliability engine.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The circuit breaker rejected the call. No context was created and no
    /// retry is attempted; callers should treat the agent as temporarily
    /// unavailable.
    #[error("agent {agent} is temporarily unavailable: circuit breaker is {state}")]
    CircuitOpen {
        agent: AgentKind,
        state: CircuitState,
    },

    /// An attempt exceeded its time bound and was cancelled.
    #[error("execution timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The unit of work failed. Transparent: the original error's message
    /// and source chain are what the caller observes.
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

impl ExecutionError {
    /// True when the breaker produced this error.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecutionError::CircuitOpen { .. })
    }

    /// True when a time bound produced this error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout { .. })
    }
}

/// Result alias used across the engine.
pub type ExecutionResult<T> = Result<T, ExecutionError>;
