//! Exponential polling intervals carried in task state.

use std::time::Duration;

use drover_types::defaults;

use crate::Result;
use crate::state::TaskState;

/// Doubling polling interval persisted under `state_key`.
///
/// Each call returns the current interval (the floor on first use) and
/// stores the next one, doubled and capped at the ceiling. With a floor of 1s
/// and a ceiling of 1200s the sequence is 1, 2, 4, ..., 1024, 1200, 1200, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingBackoff {
    state_key: String,
    floor: Duration,
    ceiling: Duration,
}

impl PollingBackoff {
    /// Intervals are stored as whole seconds, so a `floor` below one second
    /// is raised to one second; a zero interval would never grow. A
    /// `ceiling` below the floor is raised to the floor.
    pub fn new(state_key: impl Into<String>, floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_secs(1));
        Self {
            state_key: state_key.into(),
            floor,
            ceiling: ceiling.max(floor),
        }
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Take the current interval and advance the stored one.
    pub fn next_delay(&self, state: &mut TaskState) -> Result<Duration> {
        let current = state
            .get::<u64>(&self.state_key)?
            .map(Duration::from_secs)
            .unwrap_or(self.floor)
            .clamp(self.floor, self.ceiling);
        let next = current.saturating_mul(2).min(self.ceiling);
        state.set(&self.state_key, next.as_secs())?;
        Ok(current)
    }

    /// Forget the stored interval once the contended resource was acquired.
    pub fn reset(&self, state: &mut TaskState) {
        state.remove(&self.state_key);
    }
}

impl Default for PollingBackoff {
    fn default() -> Self {
        Self::new(
            "poll_interval",
            defaults::initial_poll_interval(),
            defaults::max_poll_interval(),
        )
    }
}
