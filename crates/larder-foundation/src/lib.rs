//! Larder Foundation - Execution reliability engine
//!
//! This crate wraps every pantry-agent invocation with failure isolation,
//! transient-failure recovery and bookkeeping:
//! - Circuit breaker state machine per [`AgentKind`](larder_kernel::AgentKind)
//! - Retry with exponential backoff and jitter
//! - Execution-context lifecycle with a diagnostic trail
//! - A manager coordinating all shared state under concurrent access
//! - Health and performance aggregation over bounded history
//! - Labeled metric collection with a Prometheus text rendering
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use larder_foundation::{ExecutionManager, Orchestrator, RunOptions};
//! use larder_kernel::AgentKind;
//!
//! let manager = Arc::new(ExecutionManager::new());
//! let orchestrator = Orchestrator::new(manager.clone());
//!
//! let recipes = orchestrator
//!     .run(AgentKind::RecipeSearch, "weeknight-dinner", RunOptions::default(), || async {
//!         search_recipes("weeknight dinner").await
//!     })
//!     .await?;
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod execution;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use config::ReliabilityConfig;
pub use error::{ExecutionError, ExecutionResult};
pub use execution::{
    DebugView, DecisionPoint, ExecutionContext, ExecutionManager, ExecutionSnapshot,
    ExecutionStats, ExecutionStatus, HistoryEntry, HistoryQuery, TokenUsage, ToolUsage,
};
pub use health::{AgentHealth, HealthAggregator, HealthStatus, SystemHealth};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use orchestrator::{Orchestrator, RunOptions};
pub use retry::RetryPolicy;
