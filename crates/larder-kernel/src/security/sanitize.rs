//! Recursive sanitizer for free-form JSON payloads
//!
//! Rules, applied to every level of a nested value:
//! - mapping keys containing a sensitive term (case-insensitive) have their
//!   value replaced with [`REDACTION_MARKER`]
//! - strings longer than [`MAX_STRING_LEN`] are truncated with a trailing
//!   ellipsis
//! - sequences are capped at [`MAX_SEQUENCE_LEN`] elements
//! - recursion stops at [`MAX_DEPTH`]; deeper containers collapse to a
//!   marker string

use serde_json::Value;

/// Replacement for values under a sensitive key.
pub const REDACTION_MARKER: &str = "***REDACTED***";

/// Maximum stored string length before truncation.
pub const MAX_STRING_LEN: usize = 200;

/// Maximum stored sequence length.
pub const MAX_SEQUENCE_LEN: usize = 10;

/// Maximum nesting depth the sanitizer will walk.
pub const MAX_DEPTH: usize = 8;

const ELLIPSIS: &str = "...";
const DEPTH_MARKER: &str = "***MAX-DEPTH***";

/// Key fragments whose values are never stored verbatim.
const SENSITIVE_TERMS: [&str; 6] = ["password", "token", "key", "secret", "email", "phone"];

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_TERMS.iter().any(|term| lower.contains(term))
}

/// Truncate an over-long string, keeping the first [`MAX_STRING_LEN`]
/// characters and appending an ellipsis marker.
pub fn sanitize_text(text: &str) -> String {
    if text.chars().count() > MAX_STRING_LEN {
        let mut out: String = text.chars().take(MAX_STRING_LEN).collect();
        out.push_str(ELLIPSIS);
        out
    } else {
        text.to_string()
    }
}

/// Sanitize an arbitrary JSON value for storage in diagnostic records.
pub fn sanitize_value(value: &Value) -> Value {
    sanitize_at_depth(value, 0)
}

fn sanitize_at_depth(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= MAX_DEPTH {
                return Value::String(DEPTH_MARKER.to_string());
            }
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTION_MARKER.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_at_depth(val, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return Value::String(DEPTH_MARKER.to_string());
            }
            Value::Array(
                items
                    .iter()
                    .take(MAX_SEQUENCE_LEN)
                    .map(|item| sanitize_at_depth(item, depth + 1))
                    .collect(),
            )
        }
        Value::String(text) => Value::String(sanitize_text(text)),
        other => other.clone(),
    }
}
