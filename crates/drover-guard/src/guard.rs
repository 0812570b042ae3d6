//! Exactly-once execution of a protected action.
//!
//! The protected action is keyed by an operation id that stays the same
//! across every retry of the same logical side effect. In strict mode a
//! status row records whether the action already ran; the row is locked for
//! the duration of the action so concurrent retries fail fast with
//! [`GuardError::LockConflict`] instead of running it twice.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use drover_config::GuardConfig;

use crate::target::{StatusTable, TargetConnection};
use crate::{GuardError, Result};

/// The side effect to protect. Receives the connection it runs on.
pub type Action<'a> = &'a mut dyn FnMut(&mut dyn TargetConnection) -> Result<()>;

/// Whether the protected action ran in this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Applied,
    /// The status table says an earlier call already ran it.
    AlreadyApplied,
}

impl Execution {
    pub fn is_applied(&self) -> bool {
        matches!(self, Execution::Applied)
    }
}

/// Strategy for running a protected action.
pub trait TransactionHelper: Send + Sync {
    /// Idempotently set up whatever bookkeeping the strategy needs.
    fn prepare(&self, conn: &mut dyn TargetConnection) -> Result<()>;

    fn locked_execute(
        &self,
        conn: &mut dyn TargetConnection,
        operation_id: &str,
        action: Action<'_>,
    ) -> Result<Execution>;

    /// Remove stale bookkeeping. Returns the number of rows removed.
    fn cleanup(&self, conn: &mut dyn TargetConnection) -> Result<usize>;
}

/// Status-table backed exactly-once execution.
#[derive(Debug, Clone)]
pub struct StrictTransactionHelper {
    table: StatusTable,
    retention: Duration,
}

impl StrictTransactionHelper {
    pub fn new(table: StatusTable, retention: Duration) -> Self {
        Self { table, retention }
    }

    pub fn table(&self) -> &StatusTable {
        &self.table
    }

    fn run_locked(
        &self,
        conn: &mut dyn TargetConnection,
        operation_id: &str,
        action: Action<'_>,
    ) -> Result<Execution> {
        if conn.lock_operation(&self.table, operation_id)?.is_some() {
            return Ok(Execution::AlreadyApplied);
        }

        action(&mut *conn).map_err(|e| match e {
            GuardError::LockConflict(_) => e,
            other => GuardError::Action(other.to_string()),
        })?;

        // Marked while the row lock is still held. Without transactional
        // statements the action is already permanent, so a failed mark must
        // not look like a retryable conflict.
        let transactional = conn.supports_transactional_statements();
        conn.mark_completed(&self.table, operation_id)
            .map_err(|e| if transactional { e } else { not_recorded(operation_id, e) })?;
        Ok(Execution::Applied)
    }
}

impl TransactionHelper for StrictTransactionHelper {
    fn prepare(&self, conn: &mut dyn TargetConnection) -> Result<()> {
        conn.create_status_table(&self.table)
    }

    fn locked_execute(
        &self,
        conn: &mut dyn TargetConnection,
        operation_id: &str,
        action: Action<'_>,
    ) -> Result<Execution> {
        let conflict = |e: GuardError| match e {
            GuardError::LockConflict(_) => GuardError::LockConflict(operation_id.to_string()),
            other => other,
        };

        conn.register_operation(&self.table, operation_id)
            .map_err(conflict)?;
        conn.begin().map_err(conflict)?;

        let execution = match self.run_locked(conn, operation_id, action) {
            Ok(execution) => execution,
            Err(e) => {
                if let Err(rollback) = conn.rollback() {
                    warn!(operation_id, error = %rollback, "Rollback after failed guarded action failed");
                }
                return Err(conflict(e));
            }
        };

        if let Err(e) = conn.commit() {
            if let Err(rollback) = conn.rollback() {
                warn!(operation_id, error = %rollback, "Rollback after failed commit failed");
            }
            if execution.is_applied() && !conn.supports_transactional_statements() {
                return Err(not_recorded(operation_id, e));
            }
            return Err(conflict(e));
        }

        debug!(operation_id, ?execution, table = self.table.name(), "Guarded action finished");
        Ok(execution)
    }

    fn cleanup(&self, conn: &mut dyn TargetConnection) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| GuardError::Database(format!("invalid retention: {e}")))?;
        let purged = conn.purge_before(&self.table, Utc::now() - retention)?;
        if purged > 0 {
            debug!(purged, table = self.table.name(), "Purged stale status rows");
        }
        Ok(purged)
    }
}

fn not_recorded(operation_id: &str, cause: GuardError) -> GuardError {
    warn!(operation_id, error = %cause, "Guarded action applied but its completion was not recorded");
    GuardError::CompletionNotRecorded {
        operation_id: operation_id.to_string(),
        reason: cause.to_string(),
    }
}

/// Runs the action on every call. No exactly-once guarantee.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactionHelper;

impl TransactionHelper for NoTransactionHelper {
    fn prepare(&self, _conn: &mut dyn TargetConnection) -> Result<()> {
        Ok(())
    }

    fn locked_execute(
        &self,
        conn: &mut dyn TargetConnection,
        _operation_id: &str,
        action: Action<'_>,
    ) -> Result<Execution> {
        action(conn).map_err(|e| match e {
            GuardError::LockConflict(_) => e,
            other => GuardError::Action(other.to_string()),
        })?;
        Ok(Execution::Applied)
    }

    fn cleanup(&self, _conn: &mut dyn TargetConnection) -> Result<usize> {
        Ok(0)
    }
}

/// Which guarantee a guard provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardMode {
    /// Status-table backed: the action runs at most once per operation id.
    Strict,
    /// The action runs on every call.
    NonStrict,
}

/// Front door for exactly-once execution.
pub struct ExactlyOnceGuard {
    mode: GuardMode,
    helper: Box<dyn TransactionHelper>,
}

impl ExactlyOnceGuard {
    pub fn strict(table: StatusTable, retention: Duration) -> Self {
        Self {
            mode: GuardMode::Strict,
            helper: Box::new(StrictTransactionHelper::new(table, retention)),
        }
    }

    pub fn non_strict() -> Self {
        Self {
            mode: GuardMode::NonStrict,
            helper: Box::new(NoTransactionHelper),
        }
    }

    /// Choose the mode from configuration and the target's capabilities.
    ///
    /// Logs a warning whenever the resulting guard is not strict.
    pub fn from_config(config: &GuardConfig, target: &dyn TargetConnection) -> Result<Self> {
        if !config.strict {
            warn!(
                "Exactly-once guard disabled by configuration; \
                 protected statements run again on every retry"
            );
            return Ok(Self::non_strict());
        }
        if !target.supports_row_locking() {
            warn!(
                "Target does not support row locking; downgrading exactly-once guard \
                 to non-strict mode, protected statements run again on every retry"
            );
            return Ok(Self::non_strict());
        }
        let table = StatusTable::new(&config.status_table)?;
        Ok(Self::strict(
            table,
            Duration::from_secs(config.status_table_cleanup_secs),
        ))
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    pub fn is_strict(&self) -> bool {
        self.mode == GuardMode::Strict
    }

    pub fn prepare(&self, conn: &mut dyn TargetConnection) -> Result<()> {
        self.helper.prepare(conn)
    }

    pub fn locked_execute(
        &self,
        conn: &mut dyn TargetConnection,
        operation_id: &str,
        action: Action<'_>,
    ) -> Result<Execution> {
        self.helper.locked_execute(conn, operation_id, action)
    }

    pub fn cleanup(&self, conn: &mut dyn TargetConnection) -> Result<usize> {
        self.helper.cleanup(conn)
    }

    /// Cleanup that never fails: errors are logged and dropped.
    pub fn cleanup_best_effort(&self, conn: &mut dyn TargetConnection) {
        if let Err(e) = self.helper.cleanup(conn) {
            warn!(error = %e, "Status table cleanup failed; ignoring");
        }
    }
}

impl std::fmt::Debug for ExactlyOnceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactlyOnceGuard")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteTarget;
    use crate::target::TargetCapabilities;

    fn strict() -> ExactlyOnceGuard {
        ExactlyOnceGuard::strict(StatusTable::default(), Duration::from_secs(86400))
    }

    fn counter_target() -> SqliteTarget {
        let target = SqliteTarget::open_in_memory().unwrap();
        target
            .connection()
            .execute_batch("CREATE TABLE counter (n INTEGER NOT NULL); INSERT INTO counter VALUES (0);")
            .unwrap();
        target
    }

    fn count(target: &SqliteTarget) -> i64 {
        target
            .connection()
            .query_row("SELECT n FROM counter", [], |r| r.get(0))
            .unwrap()
    }

    fn increment(conn: &mut dyn TargetConnection) -> Result<()> {
        conn.execute("UPDATE counter SET n = n + 1")?;
        Ok(())
    }

    #[test]
    fn test_strict_applies_once() {
        let guard = strict();
        let mut target = counter_target();
        guard.prepare(&mut target).unwrap();

        let results: Vec<Execution> = (0..5)
            .map(|_| guard.locked_execute(&mut target, "op-1", &mut increment).unwrap())
            .collect();

        assert_eq!(results[0], Execution::Applied);
        assert!(results[1..].iter().all(|e| *e == Execution::AlreadyApplied));
        assert_eq!(count(&target), 1);
    }

    #[test]
    fn test_distinct_operations_each_apply() {
        let guard = strict();
        let mut target = counter_target();
        guard.prepare(&mut target).unwrap();

        guard.locked_execute(&mut target, "op-1", &mut increment).unwrap();
        guard.locked_execute(&mut target, "op-2", &mut increment).unwrap();
        assert_eq!(count(&target), 2);
    }

    #[test]
    fn test_failed_action_rolls_back_and_can_retry() {
        let guard = strict();
        let mut target = counter_target();
        guard.prepare(&mut target).unwrap();

        let mut failing = |conn: &mut dyn TargetConnection| -> Result<()> {
            conn.execute("UPDATE counter SET n = n + 1")?;
            conn.execute("UPDATE no_such_table SET x = 1")?;
            Ok(())
        };
        let err = guard.locked_execute(&mut target, "op-1", &mut failing).unwrap_err();
        assert!(matches!(err, GuardError::Action(_)));
        assert_eq!(count(&target), 0);

        let again = guard.locked_execute(&mut target, "op-1", &mut increment).unwrap();
        assert_eq!(again, Execution::Applied);
        assert_eq!(count(&target), 1);
    }

    #[test]
    fn test_non_transactional_target_applies_once() {
        let guard = strict();
        let mut target = counter_target().with_capabilities(TargetCapabilities {
            row_locking: true,
            transactional_statements: false,
        });
        guard.prepare(&mut target).unwrap();

        assert!(guard.locked_execute(&mut target, "op-1", &mut increment).unwrap().is_applied());
        assert!(!guard.locked_execute(&mut target, "op-1", &mut increment).unwrap().is_applied());
        assert_eq!(count(&target), 1);
    }

    #[test]
    fn test_unrecorded_completion_is_not_retryable() {
        let guard = strict();
        let mut target = counter_target().with_capabilities(TargetCapabilities {
            row_locking: true,
            transactional_statements: false,
        });
        guard.prepare(&mut target).unwrap();

        let mut drops_status_table = |conn: &mut dyn TargetConnection| -> Result<()> {
            conn.execute("UPDATE counter SET n = n + 1")?;
            conn.execute(&format!("DROP TABLE {}", StatusTable::default().quoted()))?;
            Ok(())
        };
        let err = guard
            .locked_execute(&mut target, "op-1", &mut drops_status_table)
            .unwrap_err();
        assert!(matches!(err, GuardError::CompletionNotRecorded { .. }), "{err:?}");
        assert!(!err.is_lock_conflict());
    }

    #[test]
    fn test_non_strict_applies_every_time() {
        let guard = ExactlyOnceGuard::non_strict();
        let mut target = counter_target();
        guard.prepare(&mut target).unwrap();
        for _ in 0..3 {
            assert!(guard.locked_execute(&mut target, "op-1", &mut increment).unwrap().is_applied());
        }
        assert_eq!(count(&target), 3);
        assert_eq!(guard.cleanup(&mut target).unwrap(), 0);
    }

    #[test]
    fn test_mode_from_config() {
        let target = SqliteTarget::open_in_memory().unwrap();
        let guard = ExactlyOnceGuard::from_config(&GuardConfig::default(), &target).unwrap();
        assert_eq!(guard.mode(), GuardMode::Strict);

        let config = GuardConfig {
            strict: false,
            ..GuardConfig::default()
        };
        let guard = ExactlyOnceGuard::from_config(&config, &target).unwrap();
        assert_eq!(guard.mode(), GuardMode::NonStrict);

        let no_locks = SqliteTarget::open_in_memory()
            .unwrap()
            .with_capabilities(TargetCapabilities {
                row_locking: false,
                transactional_statements: true,
            });
        let guard = ExactlyOnceGuard::from_config(&GuardConfig::default(), &no_locks).unwrap();
        assert!(!guard.is_strict());
    }

    #[test]
    fn test_from_config_rejects_bad_table() {
        let target = SqliteTarget::open_in_memory().unwrap();
        let config = GuardConfig {
            status_table: "x; drop".into(),
            ..GuardConfig::default()
        };
        assert!(matches!(
            ExactlyOnceGuard::from_config(&config, &target),
            Err(GuardError::InvalidTableName(_))
        ));
    }

    #[test]
    fn test_cleanup_best_effort_swallows_errors() {
        let guard = strict();
        let mut target = SqliteTarget::open_in_memory().unwrap();
        // no status table yet
        assert!(guard.cleanup(&mut target).is_err());
        guard.cleanup_best_effort(&mut target);
    }
}
