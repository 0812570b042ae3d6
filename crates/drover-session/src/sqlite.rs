//! SQLite-backed session store.
//!
//! Writers serialize on the connection mutex within a process and on
//! `BEGIN IMMEDIATE` across processes. Attempt uniqueness per
//! `(session, retry name)` is enforced by a unique index, so a duplicate
//! insert fails inside the transaction rather than being checked up front.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::warn;

use drover_types::{AttemptId, Params, ProjectId, SessionId, WorkflowDefinitionId};

use crate::model::{
    AttemptWithSession, Session, SessionAttempt, StoredProject, StoredSession, StoredSessionAttempt,
};
use crate::store::{ProjectStore, SessionStore, SessionTransaction};
use crate::{StoreError, StoreResult};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// How long a writer waits for another process to release the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ATTEMPT_COLUMNS: &str = "s.id, s.project_id, s.workflow_name, s.session_time, s.last_attempt_id, s.created_at, \
     a.id, a.session_id, a.site_id, a.attempt_name, a.params, a.timezone, a.workflow_definition_id, \
     a.dependent_session_id, a.created_at, a.finished_at, a.success";

/// Session store over a single SQLite connection.
///
/// Thread-safe via internal `Mutex<Connection>`.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Projects ────────────────────────────────────────────────────

    pub fn create_project(&self, site_id: i32, name: &str) -> StoreResult<StoredProject> {
        let now = now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO projects (site_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![site_id, name, timestamp(now)],
        )?;
        Ok(StoredProject {
            id: ProjectId(conn.last_insert_rowid()),
            site_id,
            name: name.to_string(),
            created_at: now,
            deleted_at: None,
        })
    }

    /// Soft-delete a project. New attempts for it are refused afterwards.
    pub fn delete_project(&self, id: ProjectId) -> StoreResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE projects SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![timestamp(Utc::now()), id.get()],
        )?;
        if changed == 0 {
            // missing, or already deleted
            self.get_project_by_id(id)?;
        }
        Ok(())
    }

    fn query_attempt(
        &self,
        filter: &str,
        site_id: i32,
        session: &Session,
        retry_attempt_name: Option<&str>,
    ) -> StoreResult<AttemptWithSession> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} {filter}");
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                &sql,
                params![
                    session.project_id.get(),
                    session.workflow_name,
                    session.session_time.timestamp(),
                    site_id,
                    retry_attempt_name,
                ],
                |row| row_to_attempt_with_session(row, site_id),
            )
            .optional()?;
        found.ok_or_else(|| {
            StoreError::NotFound(format!(
                "session attempt of {} at {}{}",
                session.workflow_name,
                session.session_time,
                retry_attempt_name
                    .map(|n| format!(" named '{n}'"))
                    .unwrap_or_default()
            ))
        })
    }
}

impl ProjectStore for SqliteSessionStore {
    fn get_project_by_id(&self, id: ProjectId) -> StoreResult<StoredProject> {
        let conn = self.conn.lock();
        get_project(&conn, id)
    }
}

impl SessionStore for SqliteSessionStore {
    type Tx<'a> = SqliteSessionTransaction<'a>;

    fn begin(&self) -> StoreResult<SqliteSessionTransaction<'_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteSessionTransaction { conn, done: false })
    }

    fn get_attempt_by_name(
        &self,
        site_id: i32,
        session: &Session,
        retry_attempt_name: &str,
    ) -> StoreResult<AttemptWithSession> {
        self.query_attempt(
            "FROM session_attempts a JOIN sessions s ON s.id = a.session_id \
             WHERE s.project_id = ?1 AND s.workflow_name = ?2 AND s.session_time = ?3 \
             AND a.site_id = ?4 AND a.attempt_name IS ?5",
            site_id,
            session,
            Some(retry_attempt_name),
        )
    }

    fn get_last_attempt(&self, site_id: i32, session: &Session) -> StoreResult<AttemptWithSession> {
        self.query_attempt(
            "FROM sessions s JOIN session_attempts a ON a.id = s.last_attempt_id \
             WHERE s.project_id = ?1 AND s.workflow_name = ?2 AND s.session_time = ?3 \
             AND a.site_id = ?4 AND ?5 IS NULL",
            site_id,
            session,
            None,
        )
    }

    fn count_active_attempts(&self, site_id: i32) -> StoreResult<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM session_attempts WHERE site_id = ?1 AND finished_at IS NULL",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn finish_attempt(&self, attempt_id: AttemptId, success: bool) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE session_attempts SET finished_at = ?1, success = ?2 \
             WHERE id = ?3 AND finished_at IS NULL",
            params![timestamp(Utc::now()), success, attempt_id.get()],
        )?;
        if changed > 0 {
            return Ok(true);
        }
        let exists = conn
            .query_row(
                "SELECT 1 FROM session_attempts WHERE id = ?1",
                params![attempt_id.get()],
                |_| Ok(()),
            )
            .optional()?;
        match exists {
            Some(()) => Ok(false),
            None => Err(StoreError::NotFound(format!("session attempt id={attempt_id}"))),
        }
    }
}

/// Write transaction of [`SqliteSessionStore`], holding the connection lock.
pub struct SqliteSessionTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    done: bool,
}

impl ProjectStore for SqliteSessionTransaction<'_> {
    fn get_project_by_id(&self, id: ProjectId) -> StoreResult<StoredProject> {
        get_project(&self.conn, id)
    }
}

impl SessionTransaction for SqliteSessionTransaction<'_> {
    fn lock_or_create_session(&mut self, _site_id: i32, session: &Session) -> StoreResult<StoredSession> {
        // BEGIN IMMEDIATE already holds the write lock
        self.conn.execute(
            "INSERT OR IGNORE INTO sessions (project_id, workflow_name, session_time, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.project_id.get(),
                session.workflow_name,
                session.session_time.timestamp(),
                timestamp(Utc::now()),
            ],
        )?;
        let stored = self.conn.query_row(
            "SELECT id, project_id, workflow_name, session_time, last_attempt_id, created_at \
             FROM sessions WHERE project_id = ?1 AND workflow_name = ?2 AND session_time = ?3",
            params![
                session.project_id.get(),
                session.workflow_name,
                session.session_time.timestamp(),
            ],
            |row| row_to_session(row, 0),
        )?;
        Ok(stored)
    }

    fn insert_attempt(
        &mut self,
        site_id: i32,
        session: &StoredSession,
        attempt: &SessionAttempt,
        dependent_session_id: Option<SessionId>,
    ) -> StoreResult<StoredSessionAttempt> {
        let now = now();
        let params_json = serde_json::to_string(&attempt.session_params)?;

        let inserted = self.conn.execute(
            "INSERT INTO session_attempts \
             (session_id, site_id, project_id, attempt_name, workflow_definition_id, params, timezone, \
              dependent_session_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id.get(),
                site_id,
                session.project_id.get(),
                attempt.retry_attempt_name,
                attempt.workflow_definition_id.get(),
                params_json,
                attempt.time_zone,
                dependent_session_id.map(SessionId::get),
                timestamp(now),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(format!(
                    "attempt {} of session id={} already exists",
                    attempt
                        .retry_attempt_name
                        .as_deref()
                        .map(|n| format!("'{n}'"))
                        .unwrap_or_else(|| "(default)".to_string()),
                    session.id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = AttemptId(self.conn.last_insert_rowid());
        self.conn.execute(
            "UPDATE sessions SET last_attempt_id = ?1 WHERE id = ?2",
            params![id.get(), session.id.get()],
        )?;

        Ok(StoredSessionAttempt {
            id,
            session_id: session.id,
            site_id,
            retry_attempt_name: attempt.retry_attempt_name.clone(),
            session_params: attempt.session_params.clone(),
            time_zone: attempt.time_zone.clone(),
            workflow_definition_id: attempt.workflow_definition_id,
            dependent_session_id,
            created_at: now,
            finished_at: None,
            success: None,
        })
    }

    fn commit(mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }
}

impl Drop for SqliteSessionTransaction<'_> {
    fn drop(&mut self) {
        if !self.done
            && !self.conn.is_autocommit()
            && let Err(e) = self.conn.execute_batch("ROLLBACK")
        {
            warn!(error = %e, "Failed to roll back session transaction");
        }
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn dt_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn opt_dt_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => dt_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn epoch_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn params_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Params> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn row_to_session(row: &Row<'_>, offset: usize) -> rusqlite::Result<StoredSession> {
    Ok(StoredSession {
        id: SessionId(row.get(offset)?),
        project_id: ProjectId(row.get(offset + 1)?),
        workflow_name: row.get(offset + 2)?,
        session_time: epoch_column(row, offset + 3)?,
        last_attempt_id: row.get::<_, Option<i64>>(offset + 4)?.map(AttemptId),
        created_at: dt_column(row, offset + 5)?,
    })
}

fn row_to_attempt(row: &Row<'_>, offset: usize) -> rusqlite::Result<StoredSessionAttempt> {
    Ok(StoredSessionAttempt {
        id: AttemptId(row.get(offset)?),
        session_id: SessionId(row.get(offset + 1)?),
        site_id: row.get(offset + 2)?,
        retry_attempt_name: row.get(offset + 3)?,
        session_params: params_column(row, offset + 4)?,
        time_zone: row.get(offset + 5)?,
        workflow_definition_id: WorkflowDefinitionId(row.get(offset + 6)?),
        dependent_session_id: row.get::<_, Option<i64>>(offset + 7)?.map(SessionId),
        created_at: dt_column(row, offset + 8)?,
        finished_at: opt_dt_column(row, offset + 9)?,
        success: row.get(offset + 10)?,
    })
}

fn row_to_attempt_with_session(row: &Row<'_>, site_id: i32) -> rusqlite::Result<AttemptWithSession> {
    Ok(AttemptWithSession {
        site_id,
        session: row_to_session(row, 0)?,
        attempt: row_to_attempt(row, 6)?,
    })
}

fn get_project(conn: &Connection, id: ProjectId) -> StoreResult<StoredProject> {
    conn.query_row(
        "SELECT id, site_id, name, created_at, deleted_at FROM projects WHERE id = ?1",
        params![id.get()],
        |row| {
            Ok(StoredProject {
                id: ProjectId(row.get(0)?),
                site_id: row.get(1)?,
                name: row.get(2)?,
                created_at: dt_column(row, 3)?,
                deleted_at: opt_dt_column(row, 4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("project id={id}")))
}

/// Only uniqueness counts as a duplicate; foreign key and other constraint
/// failures stay database errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
