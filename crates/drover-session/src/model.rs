//! Sessions, attempts and the projects that own them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drover_types::{AttemptId, Params, ProjectId, SessionId, WorkflowDefinitionId};

/// A recurring execution slot: one workflow of one project at one logical time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub project_id: ProjectId,
    pub workflow_name: String,
    pub session_time: DateTime<Utc>,
}

impl Session {
    pub fn new(project_id: ProjectId, workflow_name: impl Into<String>, session_time: DateTime<Utc>) -> Self {
        Self {
            project_id,
            workflow_name: workflow_name.into(),
            session_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub workflow_name: String,
    pub session_time: DateTime<Utc>,
    /// Most recently inserted attempt.
    pub last_attempt_id: Option<AttemptId>,
    pub created_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn session(&self) -> Session {
        Session::new(self.project_id, self.workflow_name.clone(), self.session_time)
    }
}

/// An attempt about to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAttempt {
    /// `None` for the default attempt.
    pub retry_attempt_name: Option<String>,
    pub session_params: Params,
    pub time_zone: String,
    pub workflow_definition_id: WorkflowDefinitionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSessionAttempt {
    pub id: AttemptId,
    pub session_id: SessionId,
    pub site_id: i32,
    pub retry_attempt_name: Option<String>,
    pub session_params: Params,
    pub time_zone: String,
    pub workflow_definition_id: WorkflowDefinitionId,
    /// Session this attempt waits for before it may start.
    pub dependent_session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
}

impl StoredSessionAttempt {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// An attempt together with the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptWithSession {
    pub site_id: i32,
    pub session: StoredSession,
    pub attempt: StoredSessionAttempt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProject {
    pub id: ProjectId,
    pub site_id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoredProject {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
