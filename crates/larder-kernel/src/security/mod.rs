//! Data hygiene for diagnostic records
//!
//! Anything a caller hands the runtime for tracking purposes (input
//! snapshots, metadata, tool call arguments) may contain credentials or
//! personal data. This module scrubs such payloads before they are stored
//! anywhere a dashboard or debug endpoint can read them back.

pub mod sanitize;

pub use sanitize::{sanitize_text, sanitize_value};
