mod common;

use std::sync::Arc;

use common::nodes::StepCounterNode;
use common::quiet_runner;
use dialogweave::channels::Channel;
use dialogweave::control::RouteTarget;
use dialogweave::graphs::GraphBuilder;
use dialogweave::runtimes::{RunnerError, RuntimeConfig, SessionStatus};
use dialogweave::state::VersionedState;
use dialogweave::types::NodeKind;

/// A redo-style cycle that never terminates on its own.
fn looping_app(step_limit: u64) -> dialogweave::app::App {
    GraphBuilder::new()
        .add_node(NodeKind::Custom("redo".into()), StepCounterNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("redo".into()))
        .add_conditional_edge(
            NodeKind::Custom("redo".into()),
            Arc::new(|_| vec![RouteTarget::to("redo")]),
        )
        .add_accumulator("passes")
        .with_runtime_config(RuntimeConfig::default().with_step_limit(step_limit))
        .compile()
        .expect("valid graph")
}

/// Scenario D: reaching the ceiling inside a cycle fails the run with
/// `StepLimitExceeded`, and the last valid checkpoint is still readable.
#[tokio::test]
async fn step_ceiling_converts_cycle_into_failure() {
    let limit = 5;
    let mut runner = quiet_runner(looping_app(limit)).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();

    let err = runner.run_until_settled("s1").await.unwrap_err();
    match err {
        RunnerError::StepLimitExceeded { limit: reported, .. } => {
            assert_eq!(reported, limit)
        }
        other => panic!("expected StepLimitExceeded, got {other:?}"),
    }

    let session = runner.get_session("s1").unwrap();
    assert_eq!(session.status, SessionStatus::Failed);

    // The checkpoint history is intact for forensic replay.
    let checkpointer = runner.checkpointer().unwrap();
    let latest = checkpointer.load_latest("s1").await.unwrap().unwrap();
    assert_eq!(latest.step, limit);
    let passes = latest.state.accum.snapshot();
    assert_eq!(passes.get("passes").map(Vec::len), Some(limit as usize));
}

/// A failed session refuses further stepping.
#[tokio::test]
async fn failed_session_is_terminal() {
    let mut runner = quiet_runner(looping_app(2)).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();
    let _ = runner.run_until_settled("s1").await.unwrap_err();

    let err = runner.run_until_settled("s1").await.unwrap_err();
    assert!(matches!(err, RunnerError::SessionFailed { .. }));
}
