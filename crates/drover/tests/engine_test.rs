//! End-to-end: submit an attempt, run its guarded statement, read a secret.

use std::sync::Arc;

use chrono::DateTime;
use serde_json::json;
use tempfile::TempDir;

use drover::guard::{GuardMode, SqliteConnector, SqliteTarget, STATEMENT_PARAM};
use drover::secrets::{
    GrantTree, MemorySecretStore, SecretAccessContext, SecretError, SecretFilter, SecretScope,
};
use drover::session::{AttemptRequest, SessionStore};
use drover::task::{CancellationToken, TaskOutcome};
use drover::types::{Params, ProjectId, WorkflowDefinitionId};
use drover::{Drover, DroverConfig};

fn config(dir: &TempDir) -> DroverConfig {
    DroverConfig::from_toml(&format!(
        r#"
        [database]
        path = "{}"

        [secrets]
        default_access = ["public"]

        [task]
        max_rounds = 10
        "#,
        dir.path().join("state").join("sessions.db").display()
    ))
    .unwrap()
}

#[tokio::test]
async fn test_attempt_runs_statement_once() {
    let dir = TempDir::new().unwrap();
    let drover = Drover::open(config(&dir)).unwrap();

    let project = drover.attempts().store().create_project(0, "etl").unwrap();
    let request = AttemptRequest::new(
        project.id,
        "daily",
        DateTime::from_timestamp(1_700_006_400, 0).unwrap(),
        WorkflowDefinitionId(1),
    );
    let attempt = drover.attempts().submit_attempt(&request, None).unwrap();
    let duplicate = drover.attempts().submit_attempt(&request, None).unwrap_err();
    assert_eq!(duplicate.existing_attempt().unwrap().attempt.id, attempt.attempt.id);

    let target_path = dir.path().join("warehouse.db");
    SqliteTarget::open(&target_path)
        .unwrap()
        .connection()
        .execute_batch("CREATE TABLE loads (n INTEGER NOT NULL);")
        .unwrap();
    let statement = drover
        .guarded_statement(Arc::new(SqliteConnector::new(&target_path)))
        .unwrap();
    assert_eq!(statement.mode(), GuardMode::Strict);

    let mut params = Params::new();
    params.insert(STATEMENT_PARAM.into(), json!("INSERT INTO loads VALUES (1)"));
    let task_key = format!("{}/load", attempt.attempt.id);
    let report = drover
        .runner()
        .run(&task_key, &statement, &params, &CancellationToken::new())
        .await;
    assert_eq!(report.rounds, 2);
    match report.outcome {
        TaskOutcome::Completed(result) => assert_eq!(result["applied"], json!(true)),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let rows: i64 = SqliteTarget::open(&target_path)
        .unwrap()
        .connection()
        .query_row("SELECT COUNT(*) FROM loads", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 1);

    assert!(drover.attempts().store().finish_attempt(attempt.attempt.id, true).unwrap());
}

#[test]
fn test_default_access_is_the_system_policy() {
    let dir = TempDir::new().unwrap();
    let drover = Drover::open(config(&dir)).unwrap();
    let project = ProjectId(1);

    let store = MemorySecretStore::new()
        .with(project, SecretScope::Project, "public.api_key", "k1")
        .with(project, SecretScope::Project, "private.token", "t1");
    let resolver = drover.secret_resolver(
        SecretAccessContext::new(project, "daily", "+load"),
        GrantTree::empty(),
        SecretFilter::all(),
        Arc::new(store),
    );

    assert_eq!(resolver.context().site_id, 0);
    assert_eq!(resolver.resolve("public.api_key").unwrap(), "k1");
    assert!(matches!(
        resolver.resolve("private.token"),
        Err(SecretError::AccessDenied(_))
    ));
}

#[test]
fn test_session_store_is_created_under_configured_path() {
    let dir = TempDir::new().unwrap();
    Drover::open(config(&dir)).unwrap();
    assert!(dir.path().join("state").join("sessions.db").exists());
}
