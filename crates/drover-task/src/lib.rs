//! Suspend/resume continuation protocol for Drover tasks.
//!
//! A [`TaskRound`] does a bounded amount of work and returns a
//! [`RoundOutcome`]: done, failed, or suspended with a delay and the
//! [`TaskState`] to resume from. The [`TaskRunner`] persists that state in a
//! [`TaskStateStore`] and schedules the next round.
//!
//! Waits on external systems are expressed by suspending with a
//! [`PollingBackoff`] delay rather than by blocking inside a round.

pub mod backoff;
pub mod error;
pub mod round;
pub mod runner;
pub mod state;
pub mod store;

pub use backoff::PollingBackoff;
pub use error::{Result, TaskError};
pub use round::{RoundOutcome, TaskRound};
pub use runner::{TaskOutcome, TaskReport, TaskRunner};
pub use state::TaskState;
pub use store::{MemoryStateStore, TaskStateStore};

/// Re-exported so callers can cancel runs without depending on `tokio-util`.
pub use tokio_util::sync::CancellationToken;
