//! Drives the rounds of one task attempt.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drover_types::Params;

use crate::error::TaskError;
use crate::round::{RoundOutcome, TaskRound};
use crate::store::TaskStateStore;

/// How a task attempt ended.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(Value),
    Failed(TaskError),
    /// Cancelled between rounds.
    Cancelled,
}

/// Final report of [`TaskRunner::run`].
#[derive(Debug)]
pub struct TaskReport {
    pub outcome: TaskOutcome,
    /// Rounds that were started.
    pub rounds: u32,
}

impl TaskReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Completed(_))
    }
}

/// Runs rounds of a task attempt in sequence, persisting state in between.
///
/// Cancellation is only observed before a round starts and while waiting for
/// the next one; a running round is never interrupted except by the round
/// timeout.
pub struct TaskRunner {
    store: Arc<dyn TaskStateStore>,
    round_timeout: Option<Duration>,
    max_rounds: Option<u32>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn TaskStateStore>) -> Self {
        Self {
            store,
            round_timeout: None,
            max_rounds: None,
        }
    }

    pub fn with_round_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<u32>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStateStore> {
        &self.store
    }

    /// Run a single round from the persisted state.
    ///
    /// A suspended round's state is saved before returning; a terminal outcome
    /// clears it. Callers that schedule rounds themselves use this directly.
    pub async fn step(&self, task_key: &str, task: &dyn TaskRound, params: &Params) -> RoundOutcome {
        let state = match self.store.load(task_key) {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => return RoundOutcome::Failed(e),
        };

        let outcome = match self.round_timeout {
            Some(limit) => match tokio::time::timeout(limit, task.run_round(params, state)).await {
                Ok(outcome) => outcome,
                Err(_) => RoundOutcome::Failed(TaskError::TimedOut(limit)),
            },
            None => task.run_round(params, state).await,
        };

        let persisted = match &outcome {
            RoundOutcome::Suspend { state, .. } => self.store.save(task_key, state),
            _ => self.store.clear(task_key),
        };
        match persisted {
            Ok(()) => outcome,
            Err(e) => RoundOutcome::Failed(TaskError::State(e.to_string())),
        }
    }

    /// Run rounds until the task finishes, fails or is cancelled.
    pub async fn run(
        &self,
        task_key: &str,
        task: &dyn TaskRound,
        params: &Params,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let mut rounds = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(task = task.name(), task_key, rounds, "Task cancelled before round");
                return TaskReport {
                    outcome: TaskOutcome::Cancelled,
                    rounds,
                };
            }
            if let Some(max) = self.max_rounds
                && rounds >= max
            {
                warn!(task = task.name(), task_key, max, "Task exceeded round limit");
                if let Err(e) = self.store.clear(task_key) {
                    warn!(task_key, error = %e, "Failed to clear task state");
                }
                return TaskReport {
                    outcome: TaskOutcome::Failed(TaskError::RoundLimitExceeded(max)),
                    rounds,
                };
            }

            rounds += 1;
            debug!(task = task.name(), task_key, round = rounds, "Starting round");

            match self.step(task_key, task, params).await {
                RoundOutcome::Done(result) => {
                    debug!(task = task.name(), task_key, rounds, "Task completed");
                    return TaskReport {
                        outcome: TaskOutcome::Completed(result),
                        rounds,
                    };
                }
                RoundOutcome::Failed(err) => {
                    warn!(task = task.name(), task_key, rounds, error = %err, "Task failed");
                    return TaskReport {
                        outcome: TaskOutcome::Failed(err),
                        rounds,
                    };
                }
                RoundOutcome::Suspend { delay, .. } => {
                    debug!(task = task.name(), task_key, round = rounds, ?delay, "Task suspended");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(task = task.name(), task_key, rounds, "Task cancelled while suspended");
                            return TaskReport { outcome: TaskOutcome::Cancelled, rounds };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
