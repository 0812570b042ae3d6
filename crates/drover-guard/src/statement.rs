//! A task that runs one non-idempotent statement exactly once.
//!
//! The first round only generates an operation id and checkpoints it, so the
//! id is persisted before any side effect happens. Every later round runs the
//! statement through the guard; a lock conflict suspends the task with an
//! exponentially growing polling interval.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use drover_config::GuardConfig;
use drover_task::{PollingBackoff, RoundOutcome, TaskError, TaskRound, TaskState};
use drover_types::Params;

use crate::guard::{Execution, ExactlyOnceGuard, GuardMode};
use crate::target::{TargetConnection, TargetConnector};
use crate::{GuardError, Result};

/// State key holding the operation id.
pub const OPERATION_ID_KEY: &str = "operation_id";

/// Parameter holding the statement text.
pub const STATEMENT_PARAM: &str = "statement";

pub struct GuardedStatement {
    connector: Arc<dyn TargetConnector>,
    guard: ExactlyOnceGuard,
    backoff: PollingBackoff,
}

impl GuardedStatement {
    /// Connects once to learn the target's capabilities and pick the guard mode.
    pub fn new(
        connector: Arc<dyn TargetConnector>,
        config: &GuardConfig,
        backoff: PollingBackoff,
    ) -> Result<Self> {
        let conn = connector.connect()?;
        let guard = ExactlyOnceGuard::from_config(config, conn.as_ref())?;
        Ok(Self {
            connector,
            guard,
            backoff,
        })
    }

    pub fn mode(&self) -> GuardMode {
        self.guard.mode()
    }

    fn execute(&self, statement: &str, operation_id: &str) -> Result<Execution> {
        let mut conn = self.connector.connect()?;
        self.guard.prepare(conn.as_mut())?;

        let execution = self
            .guard
            .locked_execute(conn.as_mut(), operation_id, &mut |c: &mut dyn TargetConnection| {
                c.execute(statement).map(|_| ())
            })?;
        if !execution.is_applied() {
            debug!(operation_id, "Statement already completed according to status table; skipping");
        }

        self.guard.cleanup_best_effort(conn.as_mut());
        Ok(execution)
    }
}

#[async_trait]
impl TaskRound for GuardedStatement {
    fn name(&self) -> &str {
        "guarded_statement"
    }

    async fn run_round(&self, params: &Params, mut state: TaskState) -> RoundOutcome {
        let Some(statement) = params.get(STATEMENT_PARAM).and_then(Value::as_str) else {
            return TaskError::failed(format!("missing '{STATEMENT_PARAM}' parameter")).into();
        };

        let operation_id = match state.get::<String>(OPERATION_ID_KEY) {
            Ok(Some(id)) => id,
            Ok(None) => {
                let id = Uuid::new_v4().to_string();
                debug!(operation_id = %id, "Generated operation id for new guarded statement");
                if let Err(e) = state.set(OPERATION_ID_KEY, &id) {
                    return e.into();
                }
                return RoundOutcome::checkpoint(state);
            }
            Err(e) => return e.into(),
        };

        match self.execute(statement, &operation_id) {
            Ok(execution) => RoundOutcome::Done(json!({
                "applied": execution.is_applied(),
                "operation_id": operation_id,
            })),
            Err(GuardError::LockConflict(_)) => match self.backoff.next_delay(&mut state) {
                Ok(delay) => {
                    debug!(operation_id, ?delay, "Status row locked by another execution; polling later");
                    RoundOutcome::suspend(delay, state)
                }
                Err(e) => e.into(),
            },
            Err(e) => TaskError::failed(e.to_string()).into(),
        }
    }
}
