//! The continuation protocol between a task and whoever schedules it.
//!
//! A task never blocks a worker waiting on an external system. Each
//! invocation is one round: it receives the task parameters and the state it
//! persisted last time, and answers with one of three outcomes. Deciding when
//! the next round runs is entirely the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use drover_types::Params;

use crate::error::TaskError;
use crate::state::TaskState;

/// What a round decided.
#[derive(Debug)]
pub enum RoundOutcome {
    /// The task finished with this result.
    Done(Value),
    /// Run another round after `delay`, starting from `state`.
    Suspend { delay: Duration, state: TaskState },
    /// The task failed for good.
    Failed(TaskError),
}

impl RoundOutcome {
    pub fn suspend(delay: Duration, state: TaskState) -> Self {
        RoundOutcome::Suspend { delay, state }
    }

    /// Resume as soon as possible (used to persist state before a side effect).
    pub fn checkpoint(state: TaskState) -> Self {
        RoundOutcome::Suspend {
            delay: Duration::ZERO,
            state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RoundOutcome::Suspend { .. })
    }
}

impl From<TaskError> for RoundOutcome {
    fn from(err: TaskError) -> Self {
        RoundOutcome::Failed(err)
    }
}

/// One unit of resumable work.
///
/// Rounds of one task attempt are invoked strictly sequentially.
#[async_trait]
pub trait TaskRound: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn run_round(&self, params: &Params, state: TaskState) -> RoundOutcome;
}
