//! Health aggregation
//!
//! Read-only views over execution history and breaker state, producing
//! per-agent and system-wide health summaries for operators and dashboards.
//! All numbers are derived from the most recent window of history entries;
//! nothing here mutates engine state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use larder_kernel::{AgentKind, ErrorKind, classify_error};
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitState;
use crate::execution::{ExecutionManager, ExecutionStatus, HistoryEntry};

/// History entries per agent considered by default.
pub const DEFAULT_HEALTH_WINDOW: usize = 100;

/// Success-rate floor below which an agent is degraded.
const SUCCESS_RATE_FLOOR: f64 = 0.8;

/// Minimum sample size before the success-rate rule applies.
const SUCCESS_RATE_MIN_SAMPLES: usize = 5;

/// Samples needed before the regression check runs.
const REGRESSION_MIN_SAMPLES: usize = 10;

/// Recent-over-overall mean ratio that flags a regression.
const REGRESSION_RATIO: f64 = 1.5;

/// Health of one agent or of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure counts bucketed by coarse error kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    pub timeout: u64,
    pub validation: u64,
    pub api: u64,
    pub unknown: u64,
}

impl ErrorBreakdown {
    fn count(&mut self, kind: ErrorKind) {
        match kind {
            ErrorKind::Timeout => self.timeout += 1,
            ErrorKind::Validation => self.validation += 1,
            ErrorKind::Api => self.api += 1,
            ErrorKind::Unknown => self.unknown += 1,
        }
    }
}

/// Health report for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent: AgentKind,
    pub status: HealthStatus,
    pub breaker_state: CircuitState,
    pub success_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub sample_size: usize,
    pub error_breakdown: ErrorBreakdown,
    pub warnings: Vec<String>,
}

/// System-wide health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub generated_at: DateTime<Utc>,
    pub agents: Vec<AgentHealth>,
    pub warnings: Vec<String>,
}

/// Read-only health views over an [`ExecutionManager`].
pub struct HealthAggregator {
    manager: Arc<ExecutionManager>,
    window: usize,
}

impl HealthAggregator {
    pub fn new(manager: Arc<ExecutionManager>) -> Self {
        Self {
            manager,
            window: DEFAULT_HEALTH_WINDOW,
        }
    }

    /// Override how many recent history entries are considered per agent.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Detailed health for one agent.
    pub async fn agent_health(&self, agent: AgentKind) -> AgentHealth {
        let entries = self.manager.recent_history(agent, self.window).await;
        let breaker_state = self
            .manager
            .breaker_state(agent)
            .await
            .unwrap_or(CircuitState::Closed);
        evaluate_agent(agent, breaker_state, &entries)
    }

    /// Health of every agent plus the system-wide verdict.
    ///
    /// The system is unhealthy iff any agent is unhealthy; warnings from
    /// every non-healthy agent are surfaced as one flat list.
    pub async fn system_health(&self) -> SystemHealth {
        let mut agents = Vec::with_capacity(AgentKind::ALL.len());
        for agent in AgentKind::ALL {
            agents.push(self.agent_health(agent).await);
        }

        let status = if agents.iter().any(|a| a.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        let warnings = agents
            .iter()
            .filter(|a| a.status != HealthStatus::Healthy)
            .flat_map(|a| a.warnings.iter().map(move |w| format!("{}: {w}", a.agent)))
            .collect();

        SystemHealth {
            status,
            generated_at: Utc::now(),
            agents,
            warnings,
        }
    }
}

/// Pure derivation of one agent's health from its window of history.
fn evaluate_agent(
    agent: AgentKind,
    breaker_state: CircuitState,
    entries: &[HistoryEntry],
) -> AgentHealth {
    let total = entries.len();
    let successes = entries
        .iter()
        .filter(|e| e.status == ExecutionStatus::Success)
        .count();
    let success_rate = if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    };

    let durations: Vec<f64> = entries
        .iter()
        .filter_map(|e| e.duration_ms.map(|ms| ms as f64))
        .collect();
    let avg_duration_ms = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    let mut error_breakdown = ErrorBreakdown::default();
    for entry in entries.iter().filter(|e| e.status != ExecutionStatus::Success) {
        let message = entry.error.as_deref().unwrap_or("");
        error_breakdown.count(classify_error(message));
    }

    let mut warnings = Vec::new();
    let mut status = match breaker_state {
        CircuitState::Open => {
            warnings.push("circuit breaker open".to_string());
            HealthStatus::Unhealthy
        }
        CircuitState::HalfOpen => {
            warnings.push("circuit breaker half-open, probing recovery".to_string());
            HealthStatus::Degraded
        }
        CircuitState::Closed => {
            if success_rate < SUCCESS_RATE_FLOOR && total > SUCCESS_RATE_MIN_SAMPLES {
                warnings.push(format!(
                    "success rate {success_rate:.2} below {SUCCESS_RATE_FLOOR:.2} over {total} executions"
                ));
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            }
        }
    };

    // Performance regression: mean of the last 5 durations versus overall.
    if durations.len() >= REGRESSION_MIN_SAMPLES {
        let overall_mean = durations.iter().sum::<f64>() / durations.len() as f64;
        let recent = &durations[durations.len() - 5..];
        let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;
        if overall_mean > 0.0 && recent_mean > REGRESSION_RATIO * overall_mean {
            warnings.push(format!(
                "performance regression: recent executions {:.1}x slower than the window average",
                recent_mean / overall_mean
            ));
            // never upgrades an already worse status
            if status == HealthStatus::Healthy {
                status = HealthStatus::Degraded;
            }
        }
    }

    AgentHealth {
        agent,
        status,
        breaker_state,
        success_rate,
        avg_duration_ms,
        sample_size: total,
        error_breakdown,
        warnings,
    }
}
