//! Storage interfaces used by the attempt manager.

use drover_types::{AttemptId, ProjectId, SessionId};

use crate::StoreResult;
use crate::model::{AttemptWithSession, Session, SessionAttempt, StoredProject, StoredSession, StoredSessionAttempt};

/// Read access to projects.
pub trait ProjectStore {
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) when
    /// no project has this id. Soft-deleted projects are returned.
    fn get_project_by_id(&self, id: ProjectId) -> StoreResult<StoredProject>;
}

/// A write transaction holding the session lock.
///
/// Dropping the transaction without calling [`commit`](Self::commit) rolls it
/// back.
pub trait SessionTransaction: ProjectStore {
    /// Create the session if it is new and lock it for the rest of the
    /// transaction.
    fn lock_or_create_session(&mut self, site_id: i32, session: &Session) -> StoreResult<StoredSession>;

    /// Insert an attempt of a locked session.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) when
    /// an attempt with the same retry name already exists.
    fn insert_attempt(
        &mut self,
        site_id: i32,
        session: &StoredSession,
        attempt: &SessionAttempt,
        dependent_session_id: Option<SessionId>,
    ) -> StoreResult<StoredSessionAttempt>;

    fn commit(self) -> StoreResult<()>;
}

/// Persistent sessions and their attempts.
pub trait SessionStore: Send + Sync {
    type Tx<'a>: SessionTransaction
    where
        Self: 'a;

    /// Start a write transaction. Blocks while another writer holds the lock.
    fn begin(&self) -> StoreResult<Self::Tx<'_>>;

    /// The attempt of `session` with the given retry name.
    fn get_attempt_by_name(
        &self,
        site_id: i32,
        session: &Session,
        retry_attempt_name: &str,
    ) -> StoreResult<AttemptWithSession>;

    /// The most recently inserted attempt of `session`.
    fn get_last_attempt(&self, site_id: i32, session: &Session) -> StoreResult<AttemptWithSession>;

    /// Attempts of the site that have not finished.
    fn count_active_attempts(&self, site_id: i32) -> StoreResult<u64>;

    /// Mark an attempt finished. Returns `false` if it already was.
    fn finish_attempt(&self, attempt_id: AttemptId, success: bool) -> StoreResult<bool>;
}
