//! Execution context lifecycle
//!
//! One [`ExecutionContext`] records one task execution from admission to its
//! terminal state: identity, timing, status, token usage, and the diagnostic
//! trail (decision log, tool usage, sanitized input snapshot).
//!
//! Lifecycle: `Pending -> (start) -> Running -> (succeed | fail) -> Success | Error`.
//! Terminal transitions stamp the end time, emit metrics and a structured
//! log event, and are guarded so a context is never completed twice.
//!
//! Anything free-form that callers hand in (metadata values, tool inputs and
//! outputs, the input snapshot) passes through the kernel sanitizer before it
//! is stored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use larder_kernel::{AgentKind, classify_error, sanitize_value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::MetricsCollector;

/// Lifecycle status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl ExecutionStatus {
    /// Success and Error are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt/completion token counts accumulated over an execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One entry in the decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPoint {
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub reasoning: String,
    pub confidence: Option<f64>,
    pub context: Option<Value>,
}

/// One recorded tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool: String,
    pub duration_seconds: f64,
    pub success: bool,
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
}

#[derive(Debug)]
struct ContextRecord {
    status: ExecutionStatus,
    started: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    error: Option<String>,
    retry_count: u32,
    token_usage: TokenUsage,
    metadata: HashMap<String, Value>,
    decision_log: Vec<DecisionPoint>,
    tool_usage: Vec<ToolUsage>,
    sanitized_input: Option<Value>,
}

/// Mutable record of one in-flight (or completed) task execution.
///
/// The context is shared (`Arc`) between the manager's active set, the
/// orchestrator driving it, and whatever collaborator the caller hands it
/// to; the record state lives behind one `parking_lot::RwLock`.
#[derive(Debug)]
pub struct ExecutionContext {
    id: Uuid,
    agent: AgentKind,
    task_label: String,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    record: RwLock<ContextRecord>,
    metrics: Arc<MetricsCollector>,
}

impl ExecutionContext {
    pub(crate) fn new(
        agent: AgentKind,
        task_label: impl Into<String>,
        user_id: Option<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent,
            task_label: task_label.into(),
            user_id,
            created_at: Utc::now(),
            record: RwLock::new(ContextRecord {
                status: ExecutionStatus::Pending,
                started: None,
                started_at: None,
                duration: None,
                error: None,
                retry_count: 0,
                token_usage: TokenUsage::default(),
                metadata: HashMap::new(),
                decision_log: Vec::new(),
                tool_usage: Vec::new(),
                sanitized_input: None,
            }),
            metrics,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    pub fn task_label(&self) -> &str {
        &self.task_label
    }

    pub fn status(&self) -> ExecutionStatus {
        self.record.read().status
    }

    pub fn retry_count(&self) -> u32 {
        self.record.read().retry_count
    }

    pub fn error(&self) -> Option<String> {
        self.record.read().error.clone()
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.record.read().token_usage
    }

    /// Begin running: stamps the start time and bumps the active gauge.
    pub fn start(&self) {
        let mut record = self.record.write();
        if record.status != ExecutionStatus::Pending {
            warn!(execution_id = %self.id, status = %record.status, "start() on a non-pending context ignored");
            return;
        }
        record.status = ExecutionStatus::Running;
        record.started = Some(Instant::now());
        record.started_at = Some(Utc::now());
        drop(record);

        self.metrics.adjust_active(self.agent, 1);
    }

    /// Terminal success transition.
    pub fn succeed(&self) {
        self.finish(ExecutionStatus::Success, None);
    }

    /// Terminal failure transition.
    pub fn fail(&self, error: impl Into<String>) {
        self.finish(ExecutionStatus::Error, Some(error.into()));
    }

    fn finish(&self, status: ExecutionStatus, error: Option<String>) {
        let mut record = self.record.write();
        if record.status.is_terminal() {
            warn!(execution_id = %self.id, status = %record.status, "context already completed, ignoring");
            return;
        }
        let was_running = record.status == ExecutionStatus::Running;
        record.status = status;
        record.duration = record.started.map(|started| started.elapsed());
        record.error = error.clone();
        let duration = record.duration;
        let retry_count = record.retry_count;
        drop(record);

        self.metrics
            .record_execution(self.agent, status.as_str(), &self.task_label);
        if let Some(duration) = duration {
            self.metrics.observe_duration(self.agent, &self.task_label, duration);
        }
        if was_running {
            self.metrics.adjust_active(self.agent, -1);
        }

        match status {
            ExecutionStatus::Success => {
                info!(
                    execution_id = %self.id,
                    agent = %self.agent,
                    task = %self.task_label,
                    duration_ms = duration.map(|d| d.as_millis() as u64),
                    retries = retry_count,
                    "execution succeeded"
                );
            }
            _ => {
                let message = error.as_deref().unwrap_or("unknown");
                self.metrics.record_error(self.agent, classify_error(message), "error");
                warn!(
                    execution_id = %self.id,
                    agent = %self.agent,
                    task = %self.task_label,
                    duration_ms = duration.map(|d| d.as_millis() as u64),
                    retries = retry_count,
                    error = message,
                    "execution failed"
                );
            }
        }
    }

    /// Count one retry and emit the retry metric.
    pub(crate) fn mark_retry(&self, reason: &'static str) {
        self.record.write().retry_count += 1;
        self.metrics.record_retry(self.agent, reason);
    }

    /// Accumulate token usage and emit the per-model token counters.
    pub fn add_token_usage(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) {
        let mut record = self.record.write();
        record.token_usage.prompt_tokens += prompt_tokens;
        record.token_usage.completion_tokens += completion_tokens;
        drop(record);

        self.metrics.record_tokens(self.agent, model, "prompt", prompt_tokens);
        self.metrics.record_tokens(self.agent, model, "completion", completion_tokens);
    }

    /// Store a metadata entry. The value is sanitized first.
    pub fn set_metadata(&self, key: impl Into<String>, value: &Value) {
        self.record
            .write()
            .metadata
            .insert(key.into(), sanitize_value(value));
    }

    /// Append to the decision log. The free-form context is sanitized.
    pub fn add_decision_point(
        &self,
        decision: impl Into<String>,
        reasoning: impl Into<String>,
        confidence: Option<f64>,
        context: Option<&Value>,
    ) {
        self.record.write().decision_log.push(DecisionPoint {
            timestamp: Utc::now(),
            decision: decision.into(),
            reasoning: reasoning.into(),
            confidence,
            context: context.map(sanitize_value),
        });
    }

    /// Record one tool call. Inputs and outputs are sanitized.
    pub fn record_tool_usage(
        &self,
        tool: impl Into<String>,
        duration_seconds: f64,
        success: bool,
        inputs: Option<&Value>,
        outputs: Option<&Value>,
    ) {
        self.record.write().tool_usage.push(ToolUsage {
            tool: tool.into(),
            duration_seconds,
            success,
            inputs: inputs.map(sanitize_value),
            outputs: outputs.map(sanitize_value),
        });
    }

    /// Store the caller-supplied input snapshot, sanitized.
    pub fn set_input(&self, input: &Value) {
        self.record.write().sanitized_input = Some(sanitize_value(input));
    }

    /// Full serializable view, including the diagnostic trail.
    pub fn snapshot(&self) -> ExecutionSnapshot {
        let record = self.record.read();
        ExecutionSnapshot {
            id: self.id,
            agent: self.agent,
            task_label: self.task_label.clone(),
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            status: record.status,
            started_at: record.started_at,
            duration_ms: record.duration.map(|d| d.as_millis() as u64),
            error: record.error.clone(),
            retry_count: record.retry_count,
            token_usage: record.token_usage,
            metadata: record.metadata.clone(),
            decision_log: record.decision_log.clone(),
            tool_usage: record.tool_usage.clone(),
            sanitized_input: record.sanitized_input.clone(),
        }
    }

    /// Reduced projection stored in history. `None` until terminal.
    pub fn history_entry(&self) -> Option<HistoryEntry> {
        let record = self.record.read();
        if !record.status.is_terminal() {
            return None;
        }
        Some(HistoryEntry {
            id: self.id,
            agent: self.agent,
            task_label: self.task_label.clone(),
            status: record.status,
            completed_at: Utc::now(),
            duration_ms: record.duration.map(|d| d.as_millis() as u64),
            token_usage: record.token_usage,
            retry_count: record.retry_count,
            error: record.error.clone(),
            decision_count: record.decision_log.len(),
            tool_call_count: record.tool_usage.len(),
        })
    }
}

/// Full point-in-time view of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub agent: AgentKind,
    pub task_label: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub token_usage: TokenUsage,
    pub metadata: HashMap<String, Value>,
    pub decision_log: Vec<DecisionPoint>,
    pub tool_usage: Vec<ToolUsage>,
    pub sanitized_input: Option<Value>,
}

/// Reduced, serializable projection of a terminal execution.
///
/// No live references: once a context leaves the active set only this
/// record survives, so the diagnostic trail is kept as counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub agent: AgentKind,
    pub task_label: String,
    pub status: ExecutionStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub token_usage: TokenUsage,
    pub retry_count: u32,
    pub error: Option<String>,
    pub decision_count: usize,
    pub tool_call_count: usize,
}
