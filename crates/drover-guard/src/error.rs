use thiserror::Error;

/// Result type for guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

#[derive(Debug, Error)]
pub enum GuardError {
    /// Another execution holds the lock. Recoverable: poll again later.
    #[error("Lock conflict on '{0}'")]
    LockConflict(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The protected action itself failed; its effects were rolled back.
    #[error("Guarded action failed: {0}")]
    Action(String),

    /// The action ran and cannot be rolled back, but its completion could
    /// not be recorded. Never retried automatically.
    #[error("Operation '{operation_id}' was applied but not recorded as completed: {reason}")]
    CompletionNotRecorded { operation_id: String, reason: String },

    #[error("Invalid status table name: '{0}'")]
    InvalidTableName(String),
}

impl GuardError {
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, GuardError::LockConflict(_))
    }
}

impl From<rusqlite::Error> for GuardError {
    fn from(err: rusqlite::Error) -> Self {
        GuardError::Database(err.to_string())
    }
}
