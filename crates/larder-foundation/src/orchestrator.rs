//! Orchestrator - the instrumentation wrapper around agent work
//!
//! Takes an arbitrary asynchronous unit of work and layers reliability on
//! top: the circuit breaker gate, a per-attempt time bound, retry with
//! backoff, and the execution-context lifecycle. The unit of work is a plain
//! closure returning a future, so any call site can be wrapped without
//! implementing a trait.
//!
//! Failure handling in one place:
//! - breaker rejection propagates immediately, before any context exists
//! - a timed-out attempt is cancelled by dropping its future and still
//!   consumes one attempt
//! - errors whose message marks them non-retryable abandon the remaining
//!   budget at once
//! - after the budget is spent the caller receives the original error, not
//!   a wrapper

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use larder_kernel::{AgentKind, ErrorKind, classify_error, is_non_retryable};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ExecutionError, ExecutionResult};
use crate::execution::{ExecutionContext, ExecutionManager};
use crate::retry::RetryPolicy;

/// Per-call options for [`Orchestrator::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Retry schedule for this call.
    pub retry_policy: RetryPolicy,
    /// Per-attempt time bound (none = unbounded).
    pub timeout: Option<Duration>,
    /// Bypass the circuit breaker gate when false.
    pub enable_circuit_breaker: bool,
    /// Caller identity recorded on the context.
    pub user_id: Option<String>,
    /// Input snapshot, sanitized before storage.
    pub input: Option<Value>,
}

impl RunOptions {
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_circuit_breaker(mut self) -> Self {
        self.enable_circuit_breaker = false;
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }
}

enum AttemptError {
    Timeout(Duration),
    Task(anyhow::Error),
}

/// Wraps units of work with retry, circuit breaking and tracking.
#[derive(Clone)]
pub struct Orchestrator {
    manager: Arc<ExecutionManager>,
}

impl Orchestrator {
    pub fn new(manager: Arc<ExecutionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ExecutionManager> {
        &self.manager
    }

    /// Run `work` with full reliability handling.
    ///
    /// `work` is invoked once per attempt; it must produce a fresh future
    /// each time.
    pub async fn run<T, F, Fut>(
        &self,
        agent: AgentKind,
        task_label: &str,
        options: RunOptions,
        mut work: F,
    ) -> ExecutionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // Breaker rejection: no context, no retry, immediate propagation.
        let ctx = self
            .manager
            .create_execution(agent, task_label, options.user_id.clone(), options.enable_circuit_breaker)
            .await?;

        if let Some(input) = &options.input {
            ctx.set_input(input);
        }
        ctx.start();

        let max_retries = options.retry_policy.max_retries;
        let mut last_error: Option<ExecutionError> = None;
        let mut retry_reason: &'static str = "error";

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = options.retry_policy.delay(attempt);
                ctx.mark_retry(retry_reason);
                debug!(
                    %agent,
                    task = task_label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            let outcome = match options.timeout {
                Some(bound) => match tokio::time::timeout(bound, work()).await {
                    Ok(result) => result.map_err(AttemptError::Task),
                    // dropping the future cancels the attempt
                    Err(_) => Err(AttemptError::Timeout(bound)),
                },
                None => work().await.map_err(AttemptError::Task),
            };

            match outcome {
                Ok(value) => {
                    ctx.succeed();
                    self.manager.complete_execution(&ctx).await;
                    self.manager.cleanup_completed().await;
                    return Ok(value);
                }
                Err(AttemptError::Timeout(bound)) => {
                    warn!(
                        %agent,
                        task = task_label,
                        attempt,
                        timeout_ms = bound.as_millis() as u64,
                        "attempt timed out"
                    );
                    last_error = Some(ExecutionError::Timeout { elapsed: bound });
                    retry_reason = "timeout";
                    if attempt == max_retries {
                        break;
                    }
                    self.manager
                        .metrics()
                        .record_error(agent, ErrorKind::Timeout, "warning");
                }
                Err(AttemptError::Task(error)) => {
                    let message = error.to_string();
                    let non_retryable = is_non_retryable(&message);
                    last_error = Some(ExecutionError::Task(error));
                    retry_reason = "error";
                    if non_retryable {
                        warn!(
                            %agent,
                            task = task_label,
                            attempt,
                            error = %message,
                            "non-retryable failure, abandoning remaining attempts"
                        );
                        break;
                    }
                    if attempt == max_retries {
                        break;
                    }
                    self.manager
                        .metrics()
                        .record_error(agent, classify_error(&message), "warning");
                    warn!(%agent, task = task_label, attempt, error = %message, "attempt failed");
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ExecutionError::Task(anyhow::anyhow!("execution produced no outcome")));
        ctx.fail(error.to_string());
        self.manager.complete_execution(&ctx).await;
        self.manager.cleanup_completed().await;
        Err(error)
    }

    /// Manual span form for call sites that cannot use [`run`](Self::run):
    /// acquires and starts a context the caller drives itself.
    ///
    /// The caller must mark the context terminal (`succeed`/`fail`) and hand
    /// it back via [`finish`](Self::finish).
    pub async fn span(
        &self,
        agent: AgentKind,
        task_label: &str,
        options: RunOptions,
    ) -> ExecutionResult<Arc<ExecutionContext>> {
        let ctx = self
            .manager
            .create_execution(agent, task_label, options.user_id.clone(), options.enable_circuit_breaker)
            .await?;
        if let Some(input) = &options.input {
            ctx.set_input(input);
        }
        ctx.start();
        Ok(ctx)
    }

    /// Complete a manually driven context and run the cleanup sweep.
    pub async fn finish(&self, ctx: &Arc<ExecutionContext>) {
        self.manager.complete_execution(ctx).await;
        self.manager.cleanup_completed().await;
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            timeout: None,
            enable_circuit_breaker: true,
            user_id: None,
            input: None,
        }
    }
}
