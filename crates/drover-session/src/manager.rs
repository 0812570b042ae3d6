use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use drover_config::AttemptsConfig;
use drover_types::{ProjectId, SessionId};

use crate::model::{AttemptWithSession, Session};
use crate::request::{AttemptRequest, check_session_time};
use crate::store::{ProjectStore, SessionStore, SessionTransaction};
use crate::{AttemptError, Result, StoreError, StoreResult};

/// Creates session attempts, at most one per session and retry name.
///
/// Concurrent submissions of the same request all resolve to one stored
/// attempt: the first caller gets it back as `Ok`, every other caller gets
/// [`AttemptError::AlreadyExists`] carrying that same attempt.
pub struct AttemptManager<S: SessionStore> {
    store: Arc<S>,
    limits: AttemptsConfig,
}

impl<S: SessionStore> AttemptManager<S> {
    pub fn new(store: Arc<S>, limits: AttemptsConfig) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn site_id(&self) -> i32 {
        self.limits.site_id
    }

    /// Create an attempt for the request's session.
    ///
    /// `dependent_session_id` names a session the new attempt waits for;
    /// see [`submit_delayed_attempt`](Self::submit_delayed_attempt).
    ///
    /// The active-attempt ceiling is checked before the session lock is
    /// taken, so concurrent submitters may briefly overshoot it.
    pub fn submit_attempt(
        &self,
        request: &AttemptRequest,
        dependent_session_id: Option<SessionId>,
    ) -> Result<AttemptWithSession> {
        request.validate(self.limits.max_params_bytes)?;

        let site_id = self.limits.site_id;
        let active = self.store.count_active_attempts(site_id)?;
        if active.saturating_add(1) > self.limits.max_active_attempts {
            warn!(
                site_id,
                active,
                limit = self.limits.max_active_attempts,
                "Refusing attempt: active attempt limit reached"
            );
            return Err(AttemptError::LimitExceeded {
                limit: self.limits.max_active_attempts,
                active,
            });
        }

        let session = request.session();
        match self.insert(request, &session, dependent_session_id) {
            Ok(created) => {
                info!(
                    attempt_id = %created.attempt.id,
                    session_id = %created.session.id,
                    workflow = %session.workflow_name,
                    retry = ?request.retry_attempt_name,
                    "Session attempt created"
                );
                Ok(created)
            }
            Err(StoreError::Conflict(reason)) => {
                debug!(%reason, "Session attempt already exists, loading it");
                let existing = self.load_existing(&session, request.retry_attempt_name.as_deref())?;
                Err(AttemptError::AlreadyExists(Box::new(existing)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create an attempt that waits for another session to finish first.
    pub fn submit_delayed_attempt(
        &self,
        request: &AttemptRequest,
        dependent_session_id: SessionId,
    ) -> Result<AttemptWithSession> {
        self.submit_attempt(request, Some(dependent_session_id))
    }

    /// The attempt already stored for a session: the named retry, or the
    /// latest attempt when no name is given.
    pub fn find_attempt(
        &self,
        project_id: ProjectId,
        workflow_name: &str,
        session_time: DateTime<Utc>,
        retry_attempt_name: Option<&str>,
    ) -> Result<AttemptWithSession> {
        check_session_time(session_time)?;
        let session = Session::new(project_id, workflow_name, session_time);
        Ok(self.load_existing(&session, retry_attempt_name)?)
    }

    /// Runs in one transaction. Returning early drops the transaction, which
    /// rolls it back and releases the session lock.
    fn insert(
        &self,
        request: &AttemptRequest,
        session: &Session,
        dependent_session_id: Option<SessionId>,
    ) -> StoreResult<AttemptWithSession> {
        let site_id = self.limits.site_id;
        let mut tx = self.store.begin()?;

        // Checked before the session row is written: a session may only
        // reference a live project of this site.
        let project = tx.get_project_by_id(request.project_id)?;
        if project.is_deleted() || project.site_id != site_id {
            return Err(StoreError::NotFound(format!(
                "project id={}",
                request.project_id
            )));
        }

        let mut stored_session = tx.lock_or_create_session(site_id, session)?;

        let attempt = tx.insert_attempt(site_id, &stored_session, &request.attempt(), dependent_session_id)?;
        tx.commit()?;

        stored_session.last_attempt_id = Some(attempt.id);
        Ok(AttemptWithSession {
            site_id,
            session: stored_session,
            attempt,
        })
    }

    fn load_existing(&self, session: &Session, retry_attempt_name: Option<&str>) -> StoreResult<AttemptWithSession> {
        let site_id = self.limits.site_id;
        match retry_attempt_name {
            Some(name) => self.store.get_attempt_by_name(site_id, session, name),
            None => self.store.get_last_attempt(site_id, session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteSessionStore;
    use drover_types::WorkflowDefinitionId;

    fn manager(max_active_attempts: u64) -> (AttemptManager<SqliteSessionStore>, ProjectId) {
        let store = SqliteSessionStore::open_in_memory().unwrap();
        let project = store.create_project(0, "etl").unwrap();
        let limits = AttemptsConfig {
            max_active_attempts,
            ..Default::default()
        };
        (AttemptManager::new(Arc::new(store), limits), project.id)
    }

    fn request(project_id: ProjectId) -> AttemptRequest {
        AttemptRequest::new(
            project_id,
            "daily",
            DateTime::from_timestamp(1_700_006_400, 0).unwrap(),
            WorkflowDefinitionId(1),
        )
    }

    #[test]
    fn test_submit_then_duplicate() {
        let (manager, project) = manager(10);
        let created = manager.submit_attempt(&request(project), None).unwrap();
        assert_eq!(created.session.last_attempt_id, Some(created.attempt.id));

        let err = manager.submit_attempt(&request(project), None).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.existing_attempt().unwrap().attempt.id, created.attempt.id);
    }

    #[test]
    fn test_validation_happens_before_store_access() {
        let (manager, project) = manager(0);
        let err = manager
            .submit_attempt(&request(project).with_retry_name(" bad"), None)
            .unwrap_err();
        // the limit of zero would have refused it otherwise
        assert!(matches!(err, AttemptError::Validation(_)));
    }

    #[test]
    fn test_limit_counts_unfinished_attempts() {
        let (manager, project) = manager(1);
        let first = manager.submit_attempt(&request(project), None).unwrap();

        let err = manager
            .submit_attempt(&request(project).with_retry_name("retry1"), None)
            .unwrap_err();
        assert!(matches!(err, AttemptError::LimitExceeded { limit: 1, active: 1 }));

        manager.store().finish_attempt(first.attempt.id, false).unwrap();
        manager
            .submit_attempt(&request(project).with_retry_name("retry1"), None)
            .unwrap();
    }

    #[test]
    fn test_fractional_session_time_is_rejected() {
        let (manager, project) = manager(10);
        let whole = request(project);
        manager.submit_attempt(&whole, None).unwrap();

        let mut fractional = request(project);
        fractional.session_time = DateTime::from_timestamp(1_700_006_400, 500_000_000).unwrap();
        let err = manager.submit_attempt(&fractional, None).unwrap_err();
        assert!(matches!(err, AttemptError::Validation(_)), "{err:?}");
        assert!(matches!(
            manager.find_attempt(project, "daily", fractional.session_time, None),
            Err(AttemptError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_project_is_not_found() {
        let (manager, _) = manager(10);
        let err = manager.submit_attempt(&request(ProjectId(99)), None).unwrap_err();
        assert!(matches!(err, AttemptError::NotFound(_)), "{err:?}");
        assert_eq!(manager.store().count_active_attempts(0).unwrap(), 0);
    }

    #[test]
    fn test_project_of_other_site_is_not_found() {
        let (manager, _) = manager(10);
        let foreign = manager.store().create_project(3, "elsewhere").unwrap();
        let err = manager.submit_attempt(&request(foreign.id), None).unwrap_err();
        assert!(matches!(err, AttemptError::NotFound(_)), "{err:?}");
    }

    #[test]
    fn test_delayed_attempt_records_dependency() {
        let (manager, project) = manager(10);
        let upstream = manager.submit_attempt(&request(project), None).unwrap();

        let mut later = request(project);
        later.session_time = DateTime::from_timestamp(1_700_092_800, 0).unwrap();
        let delayed = manager.submit_delayed_attempt(&later, upstream.session.id).unwrap();
        assert_eq!(delayed.attempt.dependent_session_id, Some(upstream.session.id));
        assert_ne!(delayed.session.id, upstream.session.id);
    }

    #[test]
    fn test_find_attempt() {
        let (manager, project) = manager(10);
        let req = request(project);
        assert!(matches!(
            manager.find_attempt(project, "daily", req.session_time, None),
            Err(AttemptError::NotFound(_))
        ));

        let created = manager.submit_attempt(&req, None).unwrap();
        let found = manager
            .find_attempt(project, "daily", req.session_time, None)
            .unwrap();
        assert_eq!(found, created);
    }
}
