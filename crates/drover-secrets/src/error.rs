//! Error types for secret resolution.

use thiserror::Error;

/// Result type for secret operations.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Errors that can occur while resolving a secret.
#[derive(Debug, Error)]
pub enum SecretError {
    /// Malformed secret key or selector.
    #[error("Illegal key: '{key}': {reason}")]
    Validation { key: String, reason: String },

    /// The operator never declared a need for this key.
    #[error("Unexpected access to a secret key: '{0}'")]
    AccessFiltered(String),

    /// Neither an explicit grant nor the system policy allows the key.
    #[error("Access not granted for secret key: '{0}'")]
    AccessDenied(String),

    /// Access was granted but no store scope holds the key.
    #[error("Secret not found: '{0}'")]
    NotFound(String),

    /// The grant document contains a leaf that is not a boolean, string or table.
    #[error("Invalid secret grant at '{path}': {reason}")]
    InvalidGrant { path: String, reason: String },

    /// The secret store failed.
    #[error("Secret store error: {0}")]
    Store(String),
}

impl SecretError {
    /// Whether this error is an access-control refusal (filtered or denied).
    pub fn is_access_refusal(&self) -> bool {
        matches!(self, SecretError::AccessFiltered(_) | SecretError::AccessDenied(_))
    }
}
