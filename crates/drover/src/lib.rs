//! Drover: retry-safe attempt and task execution.
//!
//! Re-exports the component crates and wires them together from a
//! [`DroverConfig`]:
//!
//! - [`drover_session`]: deduplicated session attempt creation
//! - [`drover_task`]: suspend/resume rounds and the round runner
//! - [`drover_guard`]: exactly-once execution of non-idempotent statements
//! - [`drover_secrets`]: secret access control

pub mod engine;
pub mod error;
pub mod logging;

pub use engine::{Drover, POLL_INTERVAL_KEY};
pub use error::{DroverError, Result};

pub use drover_config::{self as config, DroverConfig};
pub use drover_guard as guard;
pub use drover_secrets as secrets;
pub use drover_session as session;
pub use drover_task as task;
pub use drover_types as types;
