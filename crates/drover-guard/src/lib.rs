//! Exactly-once execution guard for non-idempotent statements.
//!
//! Retrying a task must not apply its side effect twice. The
//! [`ExactlyOnceGuard`] records each operation in a status table on the target
//! database and runs the statement only while holding that row's lock; a
//! completed row makes every later retry a no-op. [`GuardedStatement`] wraps
//! the whole flow as a resumable task round.

pub mod error;
pub mod guard;
pub mod sqlite;
pub mod statement;
pub mod target;

pub use error::{GuardError, Result};
pub use guard::{
    Action, ExactlyOnceGuard, Execution, GuardMode, NoTransactionHelper, StrictTransactionHelper,
    TransactionHelper,
};
pub use sqlite::{SqliteConnector, SqliteTarget};
pub use statement::{GuardedStatement, OPERATION_ID_KEY, STATEMENT_PARAM};
pub use target::{StatusTable, TargetCapabilities, TargetConnection, TargetConnector};
