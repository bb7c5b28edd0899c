//! Larder Kernel - Primitives shared by the pantry agent runtime
//!
//! This crate holds the small, dependency-light building blocks the rest of
//! the workspace is built on:
//! - Agent identities (`AgentKind`) - the closed set of logical task families
//! - The execution error taxonomy and retryability classification
//! - Data hygiene (`security::sanitize`) for anything that ends up in
//!   diagnostic records

pub mod agent;
pub mod error;
pub mod security;

pub use agent::AgentKind;
pub use error::{ErrorKind, classify_error, is_non_retryable};
pub use security::sanitize::{sanitize_text, sanitize_value};
