//! Error classification
//!
//! The runtime decides "should this attempt be retried" and "which bucket
//! does this failure fall into" by inspecting the stringified error, not its
//! type. Call sites report errors from many third-party clients and prompt
//! pipelines, so a structured error-kind contract does not exist at this
//! boundary; the substring match below is the deliberate, best-effort
//! contract. Both term lists live here so a stronger contract can replace
//! them in one place.

use serde::{Deserialize, Serialize};

/// Message fragments that mark a failure as not worth retrying.
const NON_RETRYABLE_TERMS: [&str; 4] = ["validation", "invalid", "authentication", "unauthorized"];

/// Coarse failure buckets used by health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Attempt exceeded its time bound
    Timeout,
    /// Input or schema rejected by a collaborator
    Validation,
    /// Upstream API failure
    Api,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Label used for metrics and report keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Validation => "validation",
            ErrorKind::Api => "api",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an error message marks the failure as non-retryable.
///
/// Case-insensitive substring match against [`NON_RETRYABLE_TERMS`]. A match
/// means the retry budget is abandoned immediately, no matter how many
/// attempts remain.
pub fn is_non_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    NON_RETRYABLE_TERMS.iter().any(|term| lower.contains(term))
}

/// Bucket an error message for health breakdowns.
pub fn classify_error(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ErrorKind::Timeout
    } else if lower.contains("validation") || lower.contains("invalid") {
        ErrorKind::Validation
    } else if lower.contains("api") {
        ErrorKind::Api
    } else {
        ErrorKind::Unknown
    }
}
