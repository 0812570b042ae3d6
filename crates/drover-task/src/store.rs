//! Persistence for task state between rounds.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::Result;
use crate::state::TaskState;

/// Holds the state of suspended task attempts, keyed by task attempt.
pub trait TaskStateStore: Send + Sync {
    fn load(&self, task_key: &str) -> Result<Option<TaskState>>;

    fn save(&self, task_key: &str, state: &TaskState) -> Result<()>;

    /// Drop the state once the task attempt is finished.
    fn clear(&self, task_key: &str) -> Result<()>;
}

/// In-process state store.
///
/// States are held as serialized JSON so that every resume goes through the
/// same encode/decode path a durable store would.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

impl TaskStateStore for MemoryStateStore {
    fn load(&self, task_key: &str) -> Result<Option<TaskState>> {
        let states = self.states.lock();
        match states.get(task_key) {
            Some(text) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }

    fn save(&self, task_key: &str, state: &TaskState) -> Result<()> {
        let text = serde_json::to_string(state)?;
        self.states.lock().insert(task_key.to_string(), text);
        Ok(())
    }

    fn clear(&self, task_key: &str) -> Result<()> {
        self.states.lock().remove(task_key);
        Ok(())
    }
}
