//! Session attempt submission.
//!
//! A session is one workflow of one project at one logical time. Attempts
//! are its executions: the default attempt plus any named retries. The
//! [`AttemptManager`] creates them so that a session never has two attempts
//! with the same retry name, however many schedulers race to submit it.

pub mod error;
pub mod manager;
pub mod model;
pub mod request;
pub mod sqlite;
pub mod store;

pub use error::{AttemptError, Result, StoreError, StoreResult};
pub use manager::AttemptManager;
pub use model::{
    AttemptWithSession, Session, SessionAttempt, StoredProject, StoredSession, StoredSessionAttempt,
};
pub use request::AttemptRequest;
pub use sqlite::{SqliteSessionStore, SqliteSessionTransaction};
pub use store::{ProjectStore, SessionStore, SessionTransaction};
