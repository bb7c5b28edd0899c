//! Execution manager
//!
//! The single coordination point for all shared reliability state: the
//! breaker map, the active-context set, the bounded completion history and
//! per-agent queue-depth counters all live inside one `tokio::sync::RwLock`,
//! so every read-modify-write sequence (gate-then-create, complete-then-trim,
//! reset) is atomic with respect to concurrent callers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use larder_kernel::AgentKind;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
use crate::config::ReliabilityConfig;
use crate::error::{ExecutionError, ExecutionResult};
use crate::execution::context::{ExecutionContext, ExecutionSnapshot, ExecutionStatus, HistoryEntry};
use crate::metrics::MetricsCollector;

/// Default cap on retained history entries.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Hard cap on a single history listing.
const HISTORY_LIMIT_CAP: usize = 200;

struct Inner {
    breakers: HashMap<AgentKind, CircuitBreaker>,
    active: HashMap<Uuid, Arc<ExecutionContext>>,
    history: VecDeque<HistoryEntry>,
    queue_depths: HashMap<AgentKind, u64>,
}

impl Inner {
    /// Fold a terminal context into history: record the outcome on the
    /// breaker, update gauges, drop it from the active set's bookkeeping and
    /// trim history FIFO.
    fn fold(
        &mut self,
        ctx: &ExecutionContext,
        status: ExecutionStatus,
        breaker_config: &CircuitBreakerConfig,
        metrics: &MetricsCollector,
        max_history: usize,
    ) {
        let agent = ctx.agent();

        let breaker = self
            .breakers
            .entry(agent)
            .or_insert_with(|| CircuitBreaker::new(breaker_config.clone()));
        match status {
            ExecutionStatus::Success => breaker.record_success(),
            _ => breaker.record_failure(),
        }
        metrics.set_breaker_state(agent, breaker.state());

        let depth = self.queue_depths.entry(agent).or_insert(0);
        *depth = depth.saturating_sub(1);
        metrics.set_queue_depth(agent, *depth);

        if let Some(entry) = ctx.history_entry() {
            self.history.push_back(entry);
            while self.history.len() > max_history {
                self.history.pop_front();
            }
        }
    }
}

/// Owns all shared reliability state and coordinates mutation under one lock.
///
/// Constructed once at process start and passed by `Arc` to every call site.
pub struct ExecutionManager {
    inner: RwLock<Inner>,
    breaker_config: CircuitBreakerConfig,
    max_history: usize,
    metrics: Arc<MetricsCollector>,
}

impl Default for ExecutionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionManager {
    /// Manager with default breaker configuration and history cap.
    pub fn new() -> Self {
        Self::with_breaker_config(CircuitBreakerConfig::default(), DEFAULT_MAX_HISTORY)
    }

    /// Manager with an explicit breaker template and history cap.
    pub fn with_breaker_config(breaker_config: CircuitBreakerConfig, max_history: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                breakers: HashMap::new(),
                active: HashMap::new(),
                history: VecDeque::new(),
                queue_depths: HashMap::new(),
            }),
            breaker_config,
            max_history,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Manager configured from loaded settings.
    pub fn from_config(config: &ReliabilityConfig) -> Self {
        Self::with_breaker_config(config.breaker_config(), config.max_history)
    }

    /// The collector every tracked execution emits through.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Admit a new execution, gated by the agent's circuit breaker.
    ///
    /// On rejection no context is created, no gauge moves, and the error
    /// carries the breaker state observed under the lock.
    pub async fn create_execution(
        &self,
        agent: AgentKind,
        task_label: &str,
        user_id: Option<String>,
        enable_circuit_breaker: bool,
    ) -> ExecutionResult<Arc<ExecutionContext>> {
        let mut inner = self.inner.write().await;

        let breaker = inner
            .breakers
            .entry(agent)
            .or_insert_with(|| CircuitBreaker::new(self.breaker_config.clone()));

        if enable_circuit_breaker && !breaker.can_execute() {
            let state = breaker.state();
            self.metrics.set_breaker_state(agent, state);
            warn!(%agent, task = task_label, %state, "execution rejected by circuit breaker");
            return Err(ExecutionError::CircuitOpen { agent, state });
        }
        // can_execute may have moved the breaker open -> half-open
        self.metrics.set_breaker_state(agent, breaker.state());

        let ctx = Arc::new(ExecutionContext::new(
            agent,
            task_label,
            user_id,
            self.metrics.clone(),
        ));
        inner.active.insert(ctx.id(), ctx.clone());

        let depth = inner.queue_depths.entry(agent).or_insert(0);
        *depth += 1;
        self.metrics.set_queue_depth(agent, *depth);

        debug!(execution_id = %ctx.id(), %agent, task = task_label, "execution admitted");
        Ok(ctx)
    }

    /// Fold a terminal context into history and record its outcome on the
    /// breaker. Completing a context twice, or one that is not terminal, is
    /// a logged no-op.
    pub async fn complete_execution(&self, ctx: &Arc<ExecutionContext>) {
        let status = ctx.status();
        if !status.is_terminal() {
            warn!(execution_id = %ctx.id(), %status, "complete_execution on a non-terminal context ignored");
            return;
        }

        let mut inner = self.inner.write().await;
        if inner.active.remove(&ctx.id()).is_none() {
            debug!(execution_id = %ctx.id(), "context already folded into history");
            return;
        }
        inner.fold(ctx, status, &self.breaker_config, &self.metrics, self.max_history);
    }

    /// Replace an agent's breaker with a fresh Closed one (operator action).
    pub async fn reset_circuit_breaker(&self, agent: AgentKind) {
        let mut inner = self.inner.write().await;
        inner
            .breakers
            .insert(agent, CircuitBreaker::new(self.breaker_config.clone()));
        self.metrics.set_breaker_state(agent, CircuitState::Closed);
        warn!(%agent, "circuit breaker manually reset");
    }

    /// Defensive sweep: any context left in the active set that is already
    /// terminal (a caller skipped `complete_execution`) is folded into
    /// history the same way.
    pub async fn cleanup_completed(&self) {
        let mut inner = self.inner.write().await;
        let stale: Vec<Arc<ExecutionContext>> = inner
            .active
            .values()
            .filter(|ctx| ctx.status().is_terminal())
            .cloned()
            .collect();
        for ctx in stale {
            warn!(execution_id = %ctx.id(), "terminal context found in active set, folding");
            inner.active.remove(&ctx.id());
            inner.fold(&ctx, ctx.status(), &self.breaker_config, &self.metrics, self.max_history);
        }
    }

    // =========================================================================
    // Query surface
    // =========================================================================

    /// Current state of one agent's breaker, if it exists yet.
    pub async fn breaker_state(&self, agent: AgentKind) -> Option<CircuitState> {
        self.inner.read().await.breakers.get(&agent).map(|b| b.state())
    }

    /// Snapshots of every breaker created so far.
    pub async fn breaker_snapshots(&self) -> HashMap<AgentKind, CircuitBreakerSnapshot> {
        self.inner
            .read()
            .await
            .breakers
            .iter()
            .map(|(agent, breaker)| (*agent, breaker.snapshot()))
            .collect()
    }

    /// Snapshots of all currently active executions.
    pub async fn active_executions(&self) -> Vec<ExecutionSnapshot> {
        self.inner
            .read()
            .await
            .active
            .values()
            .map(|ctx| ctx.snapshot())
            .collect()
    }

    /// Bounded history listing, newest first.
    pub async fn history(&self, query: HistoryQuery) -> Vec<HistoryEntry> {
        let limit = query.limit.unwrap_or(HISTORY_LIMIT_CAP).min(HISTORY_LIMIT_CAP);
        self.inner
            .read()
            .await
            .history
            .iter()
            .rev()
            .filter(|entry| query.agent.is_none_or(|agent| entry.agent == agent))
            .filter(|entry| query.status.is_none_or(|status| entry.status == status))
            .take(limit)
            .cloned()
            .collect()
    }

    /// The most recent `n` entries for one agent, oldest first. Used by
    /// health aggregation.
    pub async fn recent_history(&self, agent: AgentKind, n: usize) -> Vec<HistoryEntry> {
        let inner = self.inner.read().await;
        let mut recent: Vec<HistoryEntry> = inner
            .history
            .iter()
            .rev()
            .filter(|entry| entry.agent == agent)
            .take(n)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Raw execution statistics, optionally narrowed to one agent.
    pub async fn stats(&self, agent: Option<AgentKind>) -> ExecutionStats {
        let inner = self.inner.read().await;

        let entries: Vec<&HistoryEntry> = inner
            .history
            .iter()
            .filter(|entry| agent.is_none_or(|a| entry.agent == a))
            .collect();

        let successes = entries
            .iter()
            .filter(|e| e.status == ExecutionStatus::Success)
            .count() as u64;
        let durations: Vec<u64> = entries.iter().filter_map(|e| e.duration_ms).collect();
        let avg_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
        };

        ExecutionStats {
            agent,
            total: entries.len() as u64,
            successes,
            failures: entries.len() as u64 - successes,
            active: inner
                .active
                .values()
                .filter(|ctx| agent.is_none_or(|a| ctx.agent() == a))
                .count() as u64,
            avg_duration_ms,
            prompt_tokens: entries.iter().map(|e| e.token_usage.prompt_tokens).sum(),
            completion_tokens: entries.iter().map(|e| e.token_usage.completion_tokens).sum(),
            retries: entries.iter().map(|e| u64::from(e.retry_count)).sum(),
        }
    }

    /// Debugging view for a single execution id.
    ///
    /// Active executions return their full snapshot (decision log, tool
    /// usage, sanitized input); completed ones only survive as their reduced
    /// history entry.
    pub async fn debug_execution(&self, id: Uuid) -> DebugView {
        let inner = self.inner.read().await;
        if let Some(ctx) = inner.active.get(&id) {
            return DebugView::Active(Box::new(ctx.snapshot()));
        }
        if let Some(entry) = inner.history.iter().rev().find(|entry| entry.id == id) {
            return DebugView::Completed(entry.clone());
        }
        DebugView::NotFound
    }

    /// Debugging view for everything known about one agent.
    pub async fn debug_agent(&self, agent: AgentKind) -> AgentDebugView {
        let inner = self.inner.read().await;
        let mut recent: Vec<HistoryEntry> = inner
            .history
            .iter()
            .rev()
            .filter(|entry| entry.agent == agent)
            .take(20)
            .cloned()
            .collect();
        recent.reverse();

        AgentDebugView {
            agent,
            breaker: inner.breakers.get(&agent).map(|b| b.snapshot()),
            queue_depth: inner.queue_depths.get(&agent).copied().unwrap_or(0),
            active: inner
                .active
                .values()
                .filter(|ctx| ctx.agent() == agent)
                .map(|ctx| ctx.snapshot())
                .collect(),
            recent_history: recent,
        }
    }
}

/// Filters for a history listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryQuery {
    pub agent: Option<AgentKind>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
}

/// Raw execution statistics over retained history plus the active set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub agent: Option<AgentKind>,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub active: u64,
    pub avg_duration_ms: Option<f64>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub retries: u64,
}

/// Result of a single-execution debug lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugView {
    Active(Box<ExecutionSnapshot>),
    Completed(HistoryEntry),
    NotFound,
}

/// Everything known about one agent, for operator debugging.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDebugView {
    pub agent: AgentKind,
    pub breaker: Option<CircuitBreakerSnapshot>,
    pub queue_depth: u64,
    pub active: Vec<ExecutionSnapshot>,
    pub recent_history: Vec<HistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager_with_threshold(threshold: u32) -> ExecutionManager {
        ExecutionManager::with_breaker_config(
            CircuitBreakerConfig::default().with_failure_threshold(threshold),
            DEFAULT_MAX_HISTORY,
        )
    }

    #[tokio::test]
    async fn create_and_complete_moves_context_to_history() {
        let manager = ExecutionManager::new();
        let ctx = manager
            .create_execution(AgentKind::Categorizer, "categorize", None, true)
            .await
            .unwrap();
        ctx.start();
        ctx.succeed();
        manager.complete_execution(&ctx).await;

        assert!(manager.active_executions().await.is_empty());
        let history = manager.history(HistoryQuery::default()).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn double_completion_records_one_breaker_outcome() {
        let manager = manager_with_threshold(2);
        let ctx = manager
            .create_execution(AgentKind::RecipeSearch, "search", None, true)
            .await
            .unwrap();
        ctx.start();
        ctx.fail("api 500");
        manager.complete_execution(&ctx).await;
        manager.complete_execution(&ctx).await;

        // one failure recorded, not two: the breaker (threshold 2) stays closed
        assert_eq!(
            manager.breaker_state(AgentKind::RecipeSearch).await,
            Some(CircuitState::Closed)
        );
        assert_eq!(manager.history(HistoryQuery::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_side_effects() {
        let manager = manager_with_threshold(1);

        let ctx = manager
            .create_execution(AgentKind::NutritionCheck, "check", None, true)
            .await
            .unwrap();
        ctx.start();
        ctx.fail("api 500");
        manager.complete_execution(&ctx).await;
        assert_eq!(
            manager.breaker_state(AgentKind::NutritionCheck).await,
            Some(CircuitState::Open)
        );

        let history_before = manager.history(HistoryQuery::default()).await.len();
        let snapshots_before = manager.breaker_snapshots().await;
        let failures_before = snapshots_before[&AgentKind::NutritionCheck].failure_count;

        let rejected = manager
            .create_execution(AgentKind::NutritionCheck, "check", None, true)
            .await;
        assert!(matches!(rejected, Err(ExecutionError::CircuitOpen { .. })));

        assert_eq!(manager.history(HistoryQuery::default()).await.len(), history_before);
        let snapshots_after = manager.breaker_snapshots().await;
        assert_eq!(snapshots_after[&AgentKind::NutritionCheck].failure_count, failures_before);
    }

    #[tokio::test]
    async fn disabled_gate_bypasses_open_breaker() {
        let manager = manager_with_threshold(1);
        let ctx = manager
            .create_execution(AgentKind::ReceiptOcr, "scan", None, true)
            .await
            .unwrap();
        ctx.start();
        ctx.fail("api 500");
        manager.complete_execution(&ctx).await;

        let ungated = manager
            .create_execution(AgentKind::ReceiptOcr, "scan", None, false)
            .await;
        assert!(ungated.is_ok());
    }

    #[tokio::test]
    async fn history_is_fifo_capped() {
        let manager = ExecutionManager::with_breaker_config(CircuitBreakerConfig::default(), 3);
        for label in ["a", "b", "c", "d"] {
            let ctx = manager
                .create_execution(AgentKind::MealPlanner, label, None, true)
                .await
                .unwrap();
            ctx.start();
            ctx.succeed();
            manager.complete_execution(&ctx).await;
        }

        let history = manager
            .history(HistoryQuery {
                agent: Some(AgentKind::MealPlanner),
                ..Default::default()
            })
            .await;
        // newest first: d, c, b - "a" was evicted
        let tasks: Vec<&str> = history.iter().map(|e| e.task_label.as_str()).collect();
        assert_eq!(tasks, vec!["d", "c", "b"]);
    }

    #[tokio::test]
    async fn cleanup_folds_stale_terminal_contexts() {
        let manager = ExecutionManager::new();
        let ctx = manager
            .create_execution(AgentKind::ExpiryAudit, "audit", None, true)
            .await
            .unwrap();
        ctx.start();
        ctx.succeed();
        // caller forgot complete_execution
        manager.cleanup_completed().await;

        assert!(manager.active_executions().await.is_empty());
        assert_eq!(manager.history(HistoryQuery::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn manual_reset_replaces_the_breaker() {
        let manager = manager_with_threshold(1);
        let ctx = manager
            .create_execution(AgentKind::PreferenceScorer, "score", None, true)
            .await
            .unwrap();
        ctx.start();
        ctx.fail("api 500");
        manager.complete_execution(&ctx).await;
        assert_eq!(
            manager.breaker_state(AgentKind::PreferenceScorer).await,
            Some(CircuitState::Open)
        );

        manager.reset_circuit_breaker(AgentKind::PreferenceScorer).await;
        assert_eq!(
            manager.breaker_state(AgentKind::PreferenceScorer).await,
            Some(CircuitState::Closed)
        );
        let ok = manager
            .create_execution(AgentKind::PreferenceScorer, "score", None, true)
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn debug_views_cover_active_completed_and_missing() {
        let manager = ExecutionManager::new();
        let ctx = manager
            .create_execution(AgentKind::SubstitutionFinder, "swap", None, true)
            .await
            .unwrap();
        ctx.start();
        let id = ctx.id();

        assert!(matches!(manager.debug_execution(id).await, DebugView::Active(_)));

        ctx.succeed();
        manager.complete_execution(&ctx).await;
        assert!(matches!(manager.debug_execution(id).await, DebugView::Completed(_)));

        assert!(matches!(
            manager.debug_execution(Uuid::new_v4()).await,
            DebugView::NotFound
        ));
    }

    #[tokio::test]
    async fn stats_aggregate_history_and_active() {
        let manager = ExecutionManager::new();
        for outcome in [true, true, false] {
            let ctx = manager
                .create_execution(AgentKind::Categorizer, "categorize", None, true)
                .await
                .unwrap();
            ctx.start();
            ctx.add_token_usage("gpt-4o-mini", 100, 20);
            if outcome {
                ctx.succeed();
            } else {
                ctx.fail("api 500");
            }
            manager.complete_execution(&ctx).await;
        }
        let _running = manager
            .create_execution(AgentKind::Categorizer, "categorize", None, true)
            .await
            .unwrap();

        let stats = manager.stats(Some(AgentKind::Categorizer)).await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.prompt_tokens, 300);
        assert!(stats.avg_duration_ms.is_some());
    }

    #[tokio::test]
    async fn concurrent_completions_never_exceed_the_history_cap() {
        let manager = Arc::new(ExecutionManager::with_breaker_config(
            CircuitBreakerConfig::default(),
            5,
        ));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let ctx = manager
                    .create_execution(AgentKind::RecipeSearch, "search", None, true)
                    .await
                    .unwrap();
                ctx.start();
                tokio::time::sleep(Duration::from_millis(1)).await;
                ctx.succeed();
                manager.complete_execution(&ctx).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = manager.history(HistoryQuery { limit: Some(100), ..Default::default() }).await;
        assert_eq!(history.len(), 5);
    }
}
