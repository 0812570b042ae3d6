//! SQLite target.
//!
//! SQLite locks the whole database rather than single rows. A transaction is
//! opened with `BEGIN IMMEDIATE`, which takes the write lock up front, and the
//! busy timeout is zero, so a second writer fails immediately with
//! `SQLITE_BUSY` and surfaces as [`GuardError::LockConflict`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::target::{StatusTable, TargetCapabilities, TargetConnection, TargetConnector};
use crate::{GuardError, Result};

pub struct SqliteTarget {
    conn: Connection,
    capabilities: TargetCapabilities,
}

impl SqliteTarget {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::ZERO)?;
        Ok(Self {
            conn,
            capabilities: TargetCapabilities::default(),
        })
    }

    /// Override the advertised capabilities (to drive degraded code paths).
    pub fn with_capabilities(mut self, capabilities: TargetCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl std::fmt::Debug for SqliteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTarget")
            .field("path", &self.conn.path())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Translate SQLite errors, turning lock contention into `LockConflict`.
fn map_err(err: rusqlite::Error, resource: &str) -> GuardError {
    if is_busy(&err) {
        GuardError::LockConflict(resource.to_string())
    } else {
        err.into()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    // fixed width so that text comparison orders by time
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GuardError::Database(format!("invalid timestamp '{text}': {e}")))
}

impl TargetConnection for SqliteTarget {
    fn capabilities(&self) -> TargetCapabilities {
        self.capabilities
    }

    fn execute(&mut self, statement: &str) -> Result<usize> {
        self.conn
            .execute(statement, [])
            .map_err(|e| map_err(e, "statement"))
    }

    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| map_err(e, "transaction"))
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| map_err(e, "commit"))
    }

    fn rollback(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn create_status_table(&mut self, table: &StatusTable) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                operation_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                completed_at TEXT
            )",
            table.quoted()
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|e| map_err(e, table.name()))
    }

    fn register_operation(&mut self, table: &StatusTable, operation_id: &str) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (operation_id, created_at) VALUES (?1, ?2)",
            table.quoted()
        );
        self.conn
            .execute(&sql, params![operation_id, timestamp(Utc::now())])
            .map_err(|e| map_err(e, operation_id))?;
        Ok(())
    }

    fn lock_operation(
        &mut self,
        table: &StatusTable,
        operation_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        // the write lock is already held since BEGIN IMMEDIATE
        let sql = format!(
            "SELECT completed_at FROM {} WHERE operation_id = ?1",
            table.quoted()
        );
        let completed: Option<Option<String>> = self
            .conn
            .query_row(&sql, params![operation_id], |row| row.get(0))
            .optional()
            .map_err(|e| map_err(e, operation_id))?;

        match completed {
            None => Err(GuardError::Database(format!(
                "status row for '{operation_id}' disappeared"
            ))),
            Some(None) => Ok(None),
            Some(Some(text)) => parse_timestamp(&text).map(Some),
        }
    }

    fn mark_completed(&mut self, table: &StatusTable, operation_id: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET completed_at = ?1 WHERE operation_id = ?2",
            table.quoted()
        );
        self.conn
            .execute(&sql, params![timestamp(Utc::now()), operation_id])
            .map_err(|e| map_err(e, operation_id))?;
        Ok(())
    }

    fn purge_before(&mut self, table: &StatusTable, cutoff: DateTime<Utc>) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE created_at < ?1", table.quoted());
        self.conn
            .execute(&sql, params![timestamp(cutoff)])
            .map_err(|e| map_err(e, table.name()))
    }
}

/// Opens [`SqliteTarget`] connections to a database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    capabilities: TargetCapabilities,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            capabilities: TargetCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: TargetCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl TargetConnector for SqliteConnector {
    fn connect(&self) -> Result<Box<dyn TargetConnection>> {
        let target = SqliteTarget::open(&self.path)?.with_capabilities(self.capabilities);
        Ok(Box::new(target))
    }
}
