//! Error types for task rounds.

use std::time::Duration;

use thiserror::Error;

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Errors that end a task attempt.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task's own logic reported a failure.
    #[error("Task failed: {0}")]
    Failed(String),

    /// A round ran past the configured round timeout.
    #[error("Round timed out after {0:?}")]
    TimedOut(Duration),

    /// The task kept suspending past the configured round limit.
    #[error("Task exceeded {0} rounds")]
    RoundLimitExceeded(u32),

    /// Persisted state could not be loaded or saved.
    #[error("Task state error: {0}")]
    State(String),

    /// A state value did not have the expected shape.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}
