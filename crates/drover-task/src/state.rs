//! Opaque per-task progress state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use drover_types::Params;

use crate::Result;

/// Progress a task carries from one round to the next.
///
/// Only the task's own logic reads or writes it. Key order is preserved
/// through serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskState(Params);

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and deserialize `key`, `None` when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.0.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` into `key`, replacing any previous value.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        self.0.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with<T: Serialize>(mut self, key: &str, value: T) -> Result<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_params(&self) -> &Params {
        &self.0
    }

    pub fn into_params(self) -> Params {
        self.0
    }
}

impl From<Params> for TaskState {
    fn from(params: Params) -> Self {
        Self(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_get_set() {
        let mut state = TaskState::new();
        state.set("poll_interval", 4u64).unwrap();
        state.set("operation_id", "abc").unwrap();

        assert_eq!(state.get::<u64>("poll_interval").unwrap(), Some(4));
        assert_eq!(state.get::<String>("operation_id").unwrap().as_deref(), Some("abc"));
        assert_eq!(state.get::<u64>("missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_serialization_error() {
        let state = TaskState::new().with("poll_interval", "soon").unwrap();
        let err = state.get::<u64>("poll_interval").unwrap_err();
        assert!(matches!(err, crate::TaskError::Serialization(_)));
    }

    #[test]
    fn test_serialization_keeps_key_order() {
        let mut state = TaskState::new();
        for key in ["zeta", "alpha", "mid"] {
            state.set(key, json!({"k": key})).unwrap();
        }
        let text = serde_json::to_string(&state).unwrap();
        assert_eq!(
            text,
            r#"{"zeta":{"k":"zeta"},"alpha":{"k":"alpha"},"mid":{"k":"mid"}}"#
        );
        let back: TaskState = serde_json::from_str(&text).unwrap();
        assert_eq!(
            back.as_params().keys().collect::<Vec<_>>(),
            vec!["zeta", "alpha", "mid"]
        );
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut state = TaskState::new()
            .with("a", 1)
            .unwrap()
            .with("b", 2)
            .unwrap()
            .with("c", 3)
            .unwrap();
        assert_eq!(state.remove("a"), Some(json!(1)));
        assert!(!state.contains("a"));
        assert_eq!(state.as_params().keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
