//! Exactly-once behaviour against an on-disk SQLite target.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use drover_config::GuardConfig;
use drover_guard::{
    ExactlyOnceGuard, Execution, GuardMode, GuardedStatement, OPERATION_ID_KEY, SqliteConnector,
    SqliteTarget, StatusTable, TargetCapabilities, TargetConnection,
};
use drover_task::{
    CancellationToken, MemoryStateStore, PollingBackoff, RoundOutcome, TaskOutcome, TaskRunner,
    TaskState, TaskStateStore,
};
use drover_types::Params;

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("warehouse.db");
    let target = SqliteTarget::open(&path).unwrap();
    target
        .connection()
        .execute_batch(
            "CREATE TABLE loads (n INTEGER NOT NULL);
             CREATE TABLE counter (n INTEGER NOT NULL); INSERT INTO counter VALUES (0);",
        )
        .unwrap();
    (dir, path)
}

fn count(path: &Path, table: &str) -> i64 {
    let target = SqliteTarget::open(path).unwrap();
    target
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

fn insert_params() -> Params {
    let mut params = Params::new();
    params.insert("statement".into(), json!("INSERT INTO loads (n) VALUES (1)"));
    params
}

fn statement(path: &Path, config: &GuardConfig) -> GuardedStatement {
    GuardedStatement::new(
        Arc::new(SqliteConnector::new(path)),
        config,
        PollingBackoff::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_guarded_statement_runs_once_across_retries() {
    let (_dir, path) = setup();
    let task = statement(&path, &GuardConfig::default());
    assert_eq!(task.mode(), GuardMode::Strict);

    let store = Arc::new(MemoryStateStore::new());
    let runner = TaskRunner::new(store.clone());

    // round 1 checkpoints the operation id, round 2 applies the statement
    assert!(matches!(
        runner.step("t", &task, &insert_params()).await,
        RoundOutcome::Suspend { delay, .. } if delay == Duration::ZERO
    ));
    let operation_id: String = store
        .load("t")
        .unwrap()
        .unwrap()
        .get(OPERATION_ID_KEY)
        .unwrap()
        .unwrap();

    let outcome = runner.step("t", &task, &insert_params()).await;
    match outcome {
        RoundOutcome::Done(v) => {
            assert_eq!(v["applied"], json!(true));
            assert_eq!(v["operation_id"], Value::String(operation_id.clone()));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(count(&path, "loads"), 1);

    // the task is retried after a crash that lost the Done result
    let resumed = TaskState::new().with(OPERATION_ID_KEY, &operation_id).unwrap();
    store.save("t", &resumed).unwrap();
    let report = runner
        .run("t", &task, &insert_params(), &CancellationToken::new())
        .await;
    match report.outcome {
        TaskOutcome::Completed(v) => assert_eq!(v["applied"], json!(false)),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(count(&path, "loads"), 1);
}

#[tokio::test]
async fn test_lock_conflict_suspends_with_backoff() {
    let (_dir, path) = setup();
    let task = statement(&path, &GuardConfig::default());
    let store = Arc::new(MemoryStateStore::new());
    let runner = TaskRunner::new(store.clone());

    runner.step("t", &task, &insert_params()).await;

    let mut holder = SqliteTarget::open(&path).unwrap();
    holder.begin().unwrap();

    for expected in [1u64, 2, 4] {
        match runner.step("t", &task, &insert_params()).await {
            RoundOutcome::Suspend { delay, state } => {
                assert_eq!(delay, Duration::from_secs(expected));
                assert!(state.contains(OPERATION_ID_KEY));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(count(&path, "loads"), 0);

    holder.rollback().unwrap();
    assert!(matches!(
        runner.step("t", &task, &insert_params()).await,
        RoundOutcome::Done(_)
    ));
    assert_eq!(count(&path, "loads"), 1);
}

#[tokio::test]
async fn test_missing_statement_fails() {
    let (_dir, path) = setup();
    let task = statement(&path, &GuardConfig::default());
    let runner = TaskRunner::new(Arc::new(MemoryStateStore::new()));
    assert!(matches!(
        runner.step("t", &task, &Params::new()).await,
        RoundOutcome::Failed(_)
    ));
}

#[tokio::test]
async fn test_non_strict_statement_runs_every_time() {
    let (_dir, path) = setup();
    let config = GuardConfig {
        strict: false,
        ..GuardConfig::default()
    };
    let task = statement(&path, &config);
    assert_eq!(task.mode(), GuardMode::NonStrict);

    let runner = TaskRunner::new(Arc::new(MemoryStateStore::new()));
    for _ in 0..2 {
        let report = runner
            .run("t", &task, &insert_params(), &CancellationToken::new())
            .await;
        assert!(report.is_completed());
    }
    assert_eq!(count(&path, "loads"), 2);
}

#[tokio::test]
async fn test_target_without_row_locking_is_downgraded() {
    let (_dir, path) = setup();
    let connector = SqliteConnector::new(&path).with_capabilities(TargetCapabilities {
        row_locking: false,
        transactional_statements: true,
    });
    let task =
        GuardedStatement::new(Arc::new(connector), &GuardConfig::default(), PollingBackoff::default())
            .unwrap();
    assert_eq!(task.mode(), GuardMode::NonStrict);
}

/// Eight workers race on one operation id, retrying on lock conflicts.
/// Returns how many saw `Applied` and the final counter value.
fn race_on_one_operation(capabilities: TargetCapabilities) -> (usize, i64) {
    let (_dir, path) = setup();
    let guard = Arc::new(ExactlyOnceGuard::strict(
        StatusTable::default(),
        Duration::from_secs(86400),
    ));
    {
        let mut target = SqliteTarget::open(&path).unwrap();
        guard.prepare(&mut target).unwrap();
    }

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let guard = guard.clone();
            let path = path.clone();
            thread::spawn(move || {
                let mut target = SqliteTarget::open(&path).unwrap().with_capabilities(capabilities);
                let mut increment = |c: &mut dyn TargetConnection| {
                    c.execute("UPDATE counter SET n = n + 1").map(|_| ())
                };
                loop {
                    match guard.locked_execute(&mut target, "load-2024-01-01", &mut increment) {
                        Ok(execution) => return execution,
                        Err(e) if e.is_lock_conflict() => thread::sleep(Duration::from_millis(5)),
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            })
        })
        .collect();

    let results: Vec<Execution> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    let applied = results.iter().filter(|e| e.is_applied()).count();

    let target = SqliteTarget::open(&path).unwrap();
    let n: i64 = target
        .connection()
        .query_row("SELECT n FROM counter", [], |r| r.get(0))
        .unwrap();
    (applied, n)
}

#[test]
fn test_concurrent_retries_apply_once() {
    assert_eq!(race_on_one_operation(TargetCapabilities::default()), (1, 1));
}

#[test]
fn test_concurrent_retries_apply_once_without_transactional_statements() {
    let capabilities = TargetCapabilities {
        row_locking: true,
        transactional_statements: false,
    };
    for round in 0..20 {
        assert_eq!(race_on_one_operation(capabilities), (1, 1), "round {round}");
    }
}
