//! The external database a guarded statement runs against.

use chrono::{DateTime, Utc};

use drover_types::{defaults, is_plain_identifier};

use crate::{GuardError, Result};

/// What the target database can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCapabilities {
    /// A status row can be locked exclusively inside a transaction.
    pub row_locking: bool,
    /// The protected statement can run in the same transaction as the
    /// status-row update.
    pub transactional_statements: bool,
}

impl Default for TargetCapabilities {
    fn default() -> Self {
        Self {
            row_locking: true,
            transactional_statements: true,
        }
    }
}

/// Name of the status table, validated as a plain identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable(String);

impl StatusTable {
    pub fn new(name: &str) -> Result<Self> {
        if !is_plain_identifier(name) {
            return Err(GuardError::InvalidTableName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The name quoted for use in SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self(defaults::STATUS_TABLE.to_string())
    }
}

/// A connection to the target database.
///
/// Status rows have the shape
/// `(operation_id TEXT UNIQUE NOT NULL, created_at, completed_at NULL)`.
pub trait TargetConnection: Send {
    fn capabilities(&self) -> TargetCapabilities;

    fn supports_row_locking(&self) -> bool {
        self.capabilities().row_locking
    }

    fn supports_transactional_statements(&self) -> bool {
        self.capabilities().transactional_statements
    }

    /// Run one statement, returning the number of affected rows.
    fn execute(&mut self, statement: &str) -> Result<usize>;

    /// Open a transaction. Fails with [`GuardError::LockConflict`] instead of
    /// waiting when the target is locked by someone else.
    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn create_status_table(&mut self, table: &StatusTable) -> Result<()>;

    /// Insert a status row for `operation_id` unless one already exists.
    fn register_operation(&mut self, table: &StatusTable, operation_id: &str) -> Result<()>;

    /// Lock the status row inside the current transaction and return its
    /// completion time.
    fn lock_operation(
        &mut self,
        table: &StatusTable,
        operation_id: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    fn mark_completed(&mut self, table: &StatusTable, operation_id: &str) -> Result<()>;

    /// Delete status rows created before `cutoff`. Returns rows deleted.
    fn purge_before(&mut self, table: &StatusTable, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Opens connections to one target.
pub trait TargetConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn TargetConnection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table_names() {
        assert_eq!(StatusTable::default().name(), "__drover_status");
        assert_eq!(StatusTable::new("load_status").unwrap().quoted(), "\"load_status\"");

        for bad in ["", "1abc", "a-b", "status; drop table x", "a\"b"] {
            assert!(matches!(
                StatusTable::new(bad),
                Err(GuardError::InvalidTableName(_))
            ));
        }
    }

    #[test]
    fn test_default_capabilities_are_full() {
        let caps = TargetCapabilities::default();
        assert!(caps.row_locking);
        assert!(caps.transactional_statements);
    }
}
