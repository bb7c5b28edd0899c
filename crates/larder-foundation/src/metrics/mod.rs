//! Metrics collection
//!
//! In-memory, labeled counters/gauges/histograms for everything the
//! reliability engine observes: execution counts and durations, active
//! executions, token usage, errors, retries, circuit-breaker states and
//! queue depths. The collector is transport-agnostic; [`prometheus`] renders
//! a snapshot into text exposition format for whoever wants to scrape it.

pub mod prometheus;

use std::collections::HashMap;
use std::time::Duration;

use larder_kernel::{AgentKind, ErrorKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitState;

pub use prometheus::render_prometheus;

/// Histogram bucket upper bounds, in seconds.
pub const DURATION_BUCKETS: [f64; 9] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

#[derive(Debug, Clone, Default)]
struct DurationHistogram {
    count: u64,
    sum_seconds: f64,
    // one slot per bound plus the overflow slot
    bucket_counts: [u64; DURATION_BUCKETS.len() + 1],
}

impl DurationHistogram {
    fn observe(&mut self, seconds: f64) {
        self.count += 1;
        self.sum_seconds += seconds;
        let slot = DURATION_BUCKETS
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(DURATION_BUCKETS.len());
        self.bucket_counts[slot] += 1;
    }
}

/// In-memory metrics collector.
///
/// Cheap to call from the hot path: every record is a short critical section
/// over a `parking_lot` lock, so the execution context can emit from
/// synchronous code.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    executions: RwLock<HashMap<(AgentKind, &'static str, String), u64>>,
    durations: RwLock<HashMap<(AgentKind, String), DurationHistogram>>,
    active: RwLock<HashMap<AgentKind, i64>>,
    tokens: RwLock<HashMap<(AgentKind, String, &'static str), u64>>,
    errors: RwLock<HashMap<(AgentKind, ErrorKind, &'static str), u64>>,
    retries: RwLock<HashMap<(AgentKind, &'static str), u64>>,
    breaker_states: RwLock<HashMap<AgentKind, u8>>,
    queue_depths: RwLock<HashMap<AgentKind, u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished execution.
    pub fn record_execution(&self, agent: AgentKind, status: &'static str, task: &str) {
        let mut map = self.executions.write();
        *map.entry((agent, status, task.to_string())).or_insert(0) += 1;
    }

    /// Observe one execution duration.
    pub fn observe_duration(&self, agent: AgentKind, task: &str, duration: Duration) {
        let mut map = self.durations.write();
        map.entry((agent, task.to_string()))
            .or_default()
            .observe(duration.as_secs_f64());
    }

    /// Move the active-execution gauge by `delta`.
    pub fn adjust_active(&self, agent: AgentKind, delta: i64) {
        let mut map = self.active.write();
        let gauge = map.entry(agent).or_insert(0);
        *gauge = (*gauge + delta).max(0);
    }

    /// Count tokens consumed by one model call.
    pub fn record_tokens(&self, agent: AgentKind, model: &str, token_type: &'static str, count: u64) {
        if count == 0 {
            return;
        }
        let mut map = self.tokens.write();
        *map.entry((agent, model.to_string(), token_type)).or_insert(0) += count;
    }

    /// Count one error by kind and severity.
    pub fn record_error(&self, agent: AgentKind, kind: ErrorKind, severity: &'static str) {
        let mut map = self.errors.write();
        *map.entry((agent, kind, severity)).or_insert(0) += 1;
    }

    /// Count one retry by reason.
    pub fn record_retry(&self, agent: AgentKind, reason: &'static str) {
        let mut map = self.retries.write();
        *map.entry((agent, reason)).or_insert(0) += 1;
    }

    /// Publish a breaker state (0 = closed, 1 = half-open, 2 = open).
    pub fn set_breaker_state(&self, agent: AgentKind, state: CircuitState) {
        self.breaker_states.write().insert(agent, state.as_gauge());
    }

    /// Publish the per-agent queue depth.
    pub fn set_queue_depth(&self, agent: AgentKind, depth: u64) {
        self.queue_depths.write().insert(agent, depth);
    }

    /// Point-in-time view of everything collected so far, rows sorted by
    /// their labels so renders are deterministic.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut executions: Vec<ExecutionCountRow> = self
            .executions
            .read()
            .iter()
            .map(|((agent, status, task), count)| ExecutionCountRow {
                agent: *agent,
                status: (*status).to_string(),
                task: task.clone(),
                count: *count,
            })
            .collect();
        executions.sort_by(|a, b| {
            (a.agent.as_str(), &a.task, &a.status).cmp(&(b.agent.as_str(), &b.task, &b.status))
        });

        let mut durations: Vec<DurationRow> = self
            .durations
            .read()
            .iter()
            .map(|((agent, task), histogram)| {
                let mut cumulative = 0;
                let buckets = histogram
                    .bucket_counts
                    .iter()
                    .enumerate()
                    .map(|(slot, count)| {
                        cumulative += count;
                        BucketRow {
                            le: DURATION_BUCKETS.get(slot).copied(),
                            cumulative_count: cumulative,
                        }
                    })
                    .collect();
                DurationRow {
                    agent: *agent,
                    task: task.clone(),
                    count: histogram.count,
                    sum_seconds: histogram.sum_seconds,
                    buckets,
                }
            })
            .collect();
        durations.sort_by(|a, b| (a.agent.as_str(), &a.task).cmp(&(b.agent.as_str(), &b.task)));

        let mut tokens: Vec<TokenRow> = self
            .tokens
            .read()
            .iter()
            .map(|((agent, model, token_type), count)| TokenRow {
                agent: *agent,
                model: model.clone(),
                token_type: (*token_type).to_string(),
                count: *count,
            })
            .collect();
        tokens.sort_by(|a, b| {
            (a.agent.as_str(), &a.model, &a.token_type).cmp(&(b.agent.as_str(), &b.model, &b.token_type))
        });

        let mut errors: Vec<ErrorRow> = self
            .errors
            .read()
            .iter()
            .map(|((agent, kind, severity), count)| ErrorRow {
                agent: *agent,
                kind: *kind,
                severity: (*severity).to_string(),
                count: *count,
            })
            .collect();
        errors.sort_by(|a, b| {
            (a.agent.as_str(), a.kind.as_str(), &a.severity)
                .cmp(&(b.agent.as_str(), b.kind.as_str(), &b.severity))
        });

        let mut retries: Vec<RetryRow> = self
            .retries
            .read()
            .iter()
            .map(|((agent, reason), count)| RetryRow {
                agent: *agent,
                reason: (*reason).to_string(),
                count: *count,
            })
            .collect();
        retries.sort_by(|a, b| (a.agent.as_str(), &a.reason).cmp(&(b.agent.as_str(), &b.reason)));

        MetricsSnapshot {
            executions,
            durations,
            active: sorted_gauges(&self.active.read(), |v| *v as f64),
            tokens,
            errors,
            retries,
            breaker_states: sorted_gauges(&self.breaker_states.read(), |v| *v as f64),
            queue_depths: sorted_gauges(&self.queue_depths.read(), |v| *v as f64),
        }
    }
}

fn sorted_gauges<V>(map: &HashMap<AgentKind, V>, as_value: impl Fn(&V) -> f64) -> Vec<GaugeRow> {
    let mut rows: Vec<GaugeRow> = map
        .iter()
        .map(|(agent, value)| GaugeRow {
            agent: *agent,
            value: as_value(value),
        })
        .collect();
    rows.sort_by(|a, b| a.agent.as_str().cmp(b.agent.as_str()));
    rows
}

/// Serializable snapshot for dashboards and the Prometheus bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub executions: Vec<ExecutionCountRow>,
    pub durations: Vec<DurationRow>,
    pub active: Vec<GaugeRow>,
    pub tokens: Vec<TokenRow>,
    pub errors: Vec<ErrorRow>,
    pub retries: Vec<RetryRow>,
    pub breaker_states: Vec<GaugeRow>,
    pub queue_depths: Vec<GaugeRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCountRow {
    pub agent: AgentKind,
    pub status: String,
    pub task: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationRow {
    pub agent: AgentKind,
    pub task: String,
    pub count: u64,
    pub sum_seconds: f64,
    pub buckets: Vec<BucketRow>,
}

/// Cumulative count at one bucket bound; `le == None` is the +Inf slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRow {
    pub le: Option<f64>,
    pub cumulative_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaugeRow {
    pub agent: AgentKind,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRow {
    pub agent: AgentKind,
    pub model: String,
    pub token_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRow {
    pub agent: AgentKind,
    pub kind: ErrorKind,
    pub severity: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRow {
    pub agent: AgentKind,
    pub reason: String,
    pub count: u64,
}
