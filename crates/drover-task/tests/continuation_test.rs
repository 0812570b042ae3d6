//! Suspend/resume behaviour of the round runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use drover_task::{
    CancellationToken, MemoryStateStore, PollingBackoff, RoundOutcome, TaskOutcome, TaskRound,
    TaskRunner, TaskState, TaskStateStore,
};
use drover_types::Params;

/// Records every state it is resumed with and suspends a fixed number of times.
struct Recorder {
    suspensions: usize,
    seen: Mutex<Vec<TaskState>>,
}

#[async_trait]
impl TaskRound for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn run_round(&self, _params: &Params, state: TaskState) -> RoundOutcome {
        let round = {
            let mut seen = self.seen.lock();
            seen.push(state.clone());
            seen.len()
        };
        if round > self.suspensions {
            return RoundOutcome::Done(Value::Object(state.into_params()));
        }
        if round == 1 {
            let mut first = TaskState::new();
            for (k, v) in [
                ("zulu", json!(1)),
                ("alpha", json!({"nested": [1, 2, 3], "b": null, "a": "x"})),
                ("mike", json!(2.5)),
            ] {
                if let Err(e) = first.set(k, v) {
                    return e.into();
                }
            }
            return RoundOutcome::checkpoint(first);
        }
        RoundOutcome::checkpoint(state)
    }
}

#[tokio::test]
async fn test_state_survives_suspend_and_resume_in_order() {
    let runner = TaskRunner::new(Arc::new(MemoryStateStore::new()));
    let task = Recorder {
        suspensions: 3,
        seen: Mutex::new(Vec::new()),
    };

    let report = runner
        .run("attempt-1/+load", &task, &Params::new(), &CancellationToken::new())
        .await;
    assert_eq!(report.rounds, 4);

    let seen = task.seen.lock();
    assert!(seen[0].is_empty());
    for resumed in &seen[1..] {
        assert_eq!(resumed, &seen[1]);
        let keys: Vec<&String> = resumed.as_params().keys().collect();
        assert_eq!(keys, vec!["zulu", "alpha", "mike"]);
        let nested = resumed.get::<Value>("alpha").unwrap().unwrap();
        assert_eq!(
            serde_json::to_string(&nested).unwrap(),
            r#"{"nested":[1,2,3],"b":null,"a":"x"}"#
        );
    }

    match report.outcome {
        TaskOutcome::Completed(v) => assert_eq!(v["mike"], json!(2.5)),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// Always hits a busy resource and backs off.
struct AlwaysBusy {
    backoff: PollingBackoff,
}

#[async_trait]
impl TaskRound for AlwaysBusy {
    fn name(&self) -> &str {
        "busy"
    }

    async fn run_round(&self, _params: &Params, mut state: TaskState) -> RoundOutcome {
        match self.backoff.next_delay(&mut state) {
            Ok(delay) => RoundOutcome::suspend(delay, state),
            Err(e) => e.into(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_suspended_keeps_state() {
    let store = Arc::new(MemoryStateStore::new());
    let runner = TaskRunner::new(store.clone());
    let task = AlwaysBusy {
        backoff: PollingBackoff::default(),
    };
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            // rounds at t=0,1,3,7; the fifth would start at t=15
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        })
    };

    let report = runner.run("t", &task, &Params::new(), &cancel).await;
    canceller.await.unwrap();

    assert!(matches!(report.outcome, TaskOutcome::Cancelled));
    assert_eq!(report.rounds, 4);

    // the suspended state is still there for a later resume
    let state = store.load("t").unwrap().unwrap();
    assert_eq!(state.get::<u64>("poll_interval").unwrap(), Some(16));
}

#[tokio::test]
async fn test_rounds_for_different_attempts_are_independent() {
    let store: Arc<dyn TaskStateStore> = Arc::new(MemoryStateStore::new());
    let runner = TaskRunner::new(store.clone());
    let backoff = PollingBackoff::default();
    let task = AlwaysBusy { backoff };

    runner.step("a", &task, &Params::new()).await;
    runner.step("a", &task, &Params::new()).await;
    runner.step("b", &task, &Params::new()).await;

    let a = store.load("a").unwrap().unwrap();
    let b = store.load("b").unwrap().unwrap();
    assert_eq!(a.get::<u64>("poll_interval").unwrap(), Some(4));
    assert_eq!(b.get::<u64>("poll_interval").unwrap(), Some(2));
}
