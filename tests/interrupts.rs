mod common;

use common::nodes::{CheckboxNode, SimpleMessageNode};
use common::{count_events, quiet_runner};
use dialogweave::channels::Channel;
use dialogweave::graphs::GraphBuilder;
use dialogweave::interrupts::InterruptKind;
use dialogweave::runtimes::{RunOutcome, RunnerError, SessionStatus};
use dialogweave::state::VersionedState;
use dialogweave::types::NodeKind;
use serde_json::json;
use std::time::Duration;

fn checkbox_app() -> dialogweave::app::App {
    GraphBuilder::new()
        .add_node(
            NodeKind::Custom("ask".into()),
            CheckboxNode {
                options: vec!["o1", "o2"],
            },
        )
        .add_node(
            NodeKind::Custom("answer".into()),
            SimpleMessageNode::new("thanks"),
        )
        .add_edge(NodeKind::Start, NodeKind::Custom("ask".into()))
        .add_edge(NodeKind::Custom("ask".into()), NodeKind::Custom("answer".into()))
        .add_edge(NodeKind::Custom("answer".into()), NodeKind::End)
        .compile()
        .expect("valid graph")
}

/// Scenario B: the node interrupts with a checkbox payload; the engine
/// emits `interrupt` and stops; resuming with `["o1"]` continues with the
/// selection as that node's return value.
#[tokio::test]
async fn checkbox_interrupt_and_resume() {
    let mut runner = quiet_runner(checkbox_app()).await;
    let stream = runner.subscribe().expect("root runner owns a bus");

    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();

    let outcome = runner.run_until_settled("s1").await.unwrap();
    let token = match &outcome {
        RunOutcome::Interrupted(token) => token.clone(),
        RunOutcome::Completed(_) => panic!("expected an interrupt"),
    };
    assert_eq!(token.kind, InterruptKind::Checkbox);
    assert_eq!(token.path, vec!["ask".to_string()]);
    assert_eq!(token.payload["options"][0], "o1");

    let events = stream.drain_until_end(Duration::from_secs(2)).await;
    assert_eq!(count_events(&events, "interrupt"), 1);
    assert_eq!(count_events(&events, "run-finished"), 0);

    let session = runner.get_session("s1").unwrap();
    assert_eq!(session.status, SessionStatus::Interrupted);

    let outcome = runner.resume("s1", json!(["o1"])).await.unwrap();
    let state = outcome.into_state().expect("run completed after resume");
    assert_eq!(state.extra.snapshot()["selection"], json!(["o1"]));
    assert_eq!(
        state.messages.snapshot().last().unwrap().content,
        "thanks"
    );
}

/// An invalid resume value leaves the run interrupted with no state
/// change.
#[tokio::test]
async fn invalid_resume_value_changes_nothing() {
    let mut runner = quiet_runner(checkbox_app()).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();
    runner.run_until_settled("s1").await.unwrap();

    let step_before = runner.get_session("s1").unwrap().step;

    // Checkbox expects an array of strings.
    let err = runner.resume("s1", json!("o1")).await.unwrap_err();
    assert!(matches!(err, RunnerError::InvalidResumeValue(_)));

    let session = runner.get_session("s1").unwrap();
    assert_eq!(session.status, SessionStatus::Interrupted);
    assert!(session.pending_interrupt.is_some());
    assert_eq!(session.step, step_before);

    // A valid value still works afterwards.
    let outcome = runner.resume("s1", json!([])).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn resume_without_pending_interrupt_fails() {
    let mut runner = quiet_runner(checkbox_app()).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();

    let err = runner.resume("s1", json!(["o1"])).await.unwrap_err();
    assert!(matches!(err, RunnerError::NoPendingInterrupt { .. }));
}

/// The checkpoint written at suspension carries the pending token, so a
/// fresh runner over the same store can resume after a crash.
#[tokio::test]
async fn interrupt_survives_checkpoint_reload() {
    let mut runner = quiet_runner(checkbox_app()).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();
    runner.run_until_settled("s1").await.unwrap();

    let checkpointer = runner.checkpointer().expect("checkpointer configured");
    let latest = checkpointer.load_latest("s1").await.unwrap().unwrap();
    assert_eq!(latest.status, SessionStatus::Interrupted);
    let stored = latest.pending_interrupt.expect("token persisted");
    assert_eq!(stored.kind, InterruptKind::Checkbox);

    // Simulate a restart: same store, fresh runner.
    let mut revived =
        dialogweave::runtimes::AppRunner::with_checkpointer(checkbox_app(), checkpointer);
    let outcome = revived.resume("s1", json!(["o2"])).await.unwrap();
    let state = outcome.into_state().expect("resumed to completion");
    assert_eq!(state.extra.snapshot()["selection"], json!(["o2"]));
}
