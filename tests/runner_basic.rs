mod common;

use common::nodes::SimpleMessageNode;
use common::{count_events, quiet_runner};
use dialogweave::channels::Channel;
use dialogweave::graphs::GraphBuilder;
use dialogweave::runtimes::{RunOutcome, SessionStatus};
use dialogweave::state::VersionedState;
use dialogweave::types::NodeKind;
use std::time::Duration;

fn single_node_app() -> dialogweave::app::App {
    GraphBuilder::new()
        .add_node(
            NodeKind::Custom("echo".into()),
            SimpleMessageNode::new("All done."),
        )
        .add_edge(NodeKind::Start, NodeKind::Custom("echo".into()))
        .add_edge(NodeKind::Custom("echo".into()), NodeKind::End)
        .compile()
        .expect("valid graph")
}

/// Scenario A: a fresh run whose entry node immediately returns terminal
/// output produces exactly one run-started, one node-completed, one
/// complete-output, one run-finished, and zero interrupts.
#[tokio::test]
async fn single_node_run_event_counts() {
    let mut runner = quiet_runner(single_node_app()).await;
    let stream = runner.subscribe().expect("root runner owns a bus");

    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("hi"))
        .await
        .unwrap();
    let outcome = runner.run_until_settled("s1").await.unwrap();

    let state = outcome.into_state().expect("run completed");
    assert_eq!(state.messages.len(), 2);

    let events = stream.drain_until_end(Duration::from_secs(2)).await;
    assert_eq!(count_events(&events, "run-started"), 1);
    assert_eq!(count_events(&events, "node-completed"), 1);
    assert_eq!(count_events(&events, "message-complete"), 1);
    assert_eq!(count_events(&events, "run-finished"), 1);
    assert_eq!(count_events(&events, "interrupt"), 0);
}

#[tokio::test]
async fn session_status_reaches_completed() {
    let mut runner = quiet_runner(single_node_app()).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("hi"))
        .await
        .unwrap();
    runner.run_until_settled("s1").await.unwrap();

    let session = runner.get_session("s1").expect("session exists");
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.pending_interrupt.is_none());
}

/// A completed conversation re-opens under the same session id: the new
/// user message is appended and the graph runs again from Start.
#[tokio::test]
async fn completed_conversation_reopens_with_new_input() {
    let mut runner = quiet_runner(single_node_app()).await;
    runner
        .create_session("thread".into(), VersionedState::new_with_user_message("first"))
        .await
        .unwrap();
    runner.run_until_settled("thread").await.unwrap();

    runner
        .create_session(
            "thread".into(),
            VersionedState::new_with_user_message("second"),
        )
        .await
        .unwrap();
    let outcome = runner.run_until_settled("thread").await.unwrap();

    let state = outcome.into_state().expect("run completed");
    // first + reply + second + reply
    let messages = state.messages.snapshot();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2].content, "second");
}

/// Checkpoints are strictly monotonic and none are skipped.
#[tokio::test]
async fn checkpoints_are_monotonic() {
    let mut runner = quiet_runner(single_node_app()).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("hi"))
        .await
        .unwrap();
    runner.run_until_settled("s1").await.unwrap();

    let checkpointer = runner.checkpointer().expect("checkpointer configured");
    let history = checkpointer.load_history("s1").await.unwrap();
    let steps: Vec<u64> = history.iter().map(|cp| cp.step).collect();
    assert_eq!(steps, vec![0, 1]);
    assert!(matches!(
        runner.run_until_settled("s1").await.unwrap(),
        RunOutcome::Completed(_)
    ));
}
