//! Error types for attempt submission and the session store.

use thiserror::Error;

use crate::model::AttemptWithSession;

/// Result type for attempt manager operations.
pub type Result<T> = std::result::Result<T, AttemptError>;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by the attempt manager.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The request is malformed. Never retried automatically.
    #[error("Invalid attempt request: {0}")]
    Validation(String),

    /// Too many attempts are active. The caller may retry later.
    #[error("Too many attempts running. Limit: {limit}, Current: {active}")]
    LimitExceeded { limit: u64, active: u64 },

    /// An attempt already exists for this session and retry name.
    #[error("Session attempt already exists (attempt id {})", .0.attempt.id)]
    AlreadyExists(Box<AttemptWithSession>),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected persistence failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AttemptError {
    /// The pre-existing attempt carried by a conflict.
    pub fn existing_attempt(&self) -> Option<&AttemptWithSession> {
        match self {
            AttemptError::AlreadyExists(existing) => Some(existing),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AttemptError::AlreadyExists(_))
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AttemptError::NotFound(what),
            other => AttemptError::Storage(other.to_string()),
        }
    }
}

/// Errors raised by session store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Resource conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
