//! Shared types for the Drover execution core.
//!
//! Identifiers, parameter documents, and the default values shared between
//! the configuration crate and the components that consume it.

pub mod defaults;
pub mod id;

pub use id::{AttemptId, ProjectId, SessionId, WorkflowDefinitionId};

/// A structured key-value document (session parameters, task state).
///
/// Backed by `serde_json::Map` with `preserve_order`, so key order survives
/// serialization round trips.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Whether `name` can be spliced into SQL text as a table name: ASCII
/// letters, digits and underscores, not starting with a digit.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
