//! Attempt submission requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drover_types::defaults::MAX_NAME_LENGTH;
use drover_types::{Params, ProjectId, WorkflowDefinitionId};

use crate::model::{Session, SessionAttempt};
use crate::{AttemptError, Result};

/// A request to start an attempt of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRequest {
    pub project_id: ProjectId,
    pub workflow_name: String,
    pub session_time: DateTime<Utc>,
    /// `None` requests the default attempt; a name requests a retry.
    pub retry_attempt_name: Option<String>,
    pub session_params: Params,
    pub time_zone: String,
    pub workflow_definition_id: WorkflowDefinitionId,
}

impl AttemptRequest {
    pub fn new(
        project_id: ProjectId,
        workflow_name: impl Into<String>,
        session_time: DateTime<Utc>,
        workflow_definition_id: WorkflowDefinitionId,
    ) -> Self {
        Self {
            project_id,
            workflow_name: workflow_name.into(),
            session_time,
            retry_attempt_name: None,
            session_params: Params::new(),
            time_zone: "UTC".to_string(),
            workflow_definition_id,
        }
    }

    pub fn with_retry_name(mut self, name: impl Into<String>) -> Self {
        self.retry_attempt_name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.session_params = params;
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Reject malformed requests before touching the store.
    pub fn validate(&self, max_params_bytes: usize) -> Result<()> {
        if self.workflow_name.is_empty() {
            return Err(invalid("workflow name must not be empty"));
        }
        if self.workflow_name.chars().count() > MAX_NAME_LENGTH {
            return Err(invalid(format!(
                "workflow name is longer than {MAX_NAME_LENGTH} characters"
            )));
        }

        check_session_time(self.session_time)?;

        if let Some(name) = &self.retry_attempt_name {
            if name.is_empty() {
                return Err(invalid("retry attempt name must not be empty"));
            }
            if name.chars().count() > MAX_NAME_LENGTH {
                return Err(invalid(format!(
                    "retry attempt name is longer than {MAX_NAME_LENGTH} characters"
                )));
            }
            if name.trim() != name {
                return Err(invalid(
                    "retry attempt name must not start or end with whitespace",
                ));
            }
            if name.chars().any(char::is_control) {
                return Err(invalid(
                    "retry attempt name must not contain control characters",
                ));
            }
        }

        if self.time_zone.trim().is_empty() {
            return Err(invalid("time zone must not be empty"));
        }

        let size = serde_json::to_vec(&self.session_params)
            .map_err(|e| invalid(format!("session params are not serializable: {e}")))?
            .len();
        if size > max_params_bytes {
            return Err(invalid(format!(
                "session params are {size} bytes, larger than the {max_params_bytes} byte limit"
            )));
        }

        Ok(())
    }

    pub fn session(&self) -> Session {
        Session::new(self.project_id, self.workflow_name.clone(), self.session_time)
    }

    pub fn attempt(&self) -> SessionAttempt {
        SessionAttempt {
            retry_attempt_name: self.retry_attempt_name.clone(),
            session_params: self.session_params.clone(),
            time_zone: self.time_zone.clone(),
            workflow_definition_id: self.workflow_definition_id,
        }
    }
}

/// Sessions are keyed by whole seconds; a fractional time would silently
/// share a session with its truncation.
pub(crate) fn check_session_time(session_time: DateTime<Utc>) -> Result<()> {
    if session_time.timestamp_subsec_nanos() != 0 {
        return Err(invalid(format!(
            "session time {session_time} has a fractional second"
        )));
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> AttemptError {
    AttemptError::Validation(reason.into())
}
