//! Execution tracking
//!
//! - [`context`] - the per-execution lifecycle record
//! - [`manager`] - the coordination point owning breakers, the active set,
//!   bounded history and queue-depth bookkeeping

pub mod context;
pub mod manager;

pub use context::{
    DecisionPoint, ExecutionContext, ExecutionSnapshot, ExecutionStatus, HistoryEntry, TokenUsage,
    ToolUsage,
};
pub use manager::{AgentDebugView, DebugView, ExecutionManager, ExecutionStats, HistoryQuery};
