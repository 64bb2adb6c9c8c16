mod common;

use std::sync::Arc;

use common::nodes::{CheckboxNode, StepCounterNode};
use common::quiet_runner;
use dialogweave::channels::Channel;
use dialogweave::control::RouteTarget;
use dialogweave::graphs::GraphBuilder;
use dialogweave::state::VersionedState;
use dialogweave::types::NodeKind;
use serde_json::json;

/// Three bounded passes of an accumulating node.
fn bounded_loop_app() -> dialogweave::app::App {
    GraphBuilder::new()
        .add_node(NodeKind::Custom("work".into()), StepCounterNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("work".into()))
        .add_conditional_edge(
            NodeKind::Custom("work".into()),
            Arc::new(|snapshot| {
                if snapshot.accum_list("passes").len() < 3 {
                    vec![RouteTarget::to("work")]
                } else {
                    vec![RouteTarget::end()]
                }
            }),
        )
        .add_accumulator("passes")
        .compile()
        .expect("valid graph")
}

/// Identical inputs and collaborator behaviour reproduce identical state,
/// step by step.
#[tokio::test]
async fn two_runs_produce_identical_histories() {
    let mut states = Vec::new();
    let mut histories = Vec::new();
    for _ in 0..2 {
        let mut runner = quiet_runner(bounded_loop_app()).await;
        runner
            .create_session("s".into(), VersionedState::new_with_user_message("go"))
            .await
            .unwrap();
        let outcome = runner.run_until_settled("s").await.unwrap();
        states.push(outcome.into_state().expect("completed"));
        let history = runner.checkpointer().unwrap().load_history("s").await.unwrap();
        histories.push(
            history
                .iter()
                .map(|cp| (cp.step, cp.state.clone()))
                .collect::<Vec<_>>(),
        );
    }

    assert_eq!(states[0], states[1]);
    assert_eq!(histories[0], histories[1]);
    assert_eq!(
        states[0].accum.snapshot()["passes"],
        vec![json!(1), json!(2), json!(3)]
    );
}

/// Append-accumulate channels never lose entries, including across an
/// interrupt/resume cycle.
#[tokio::test]
async fn accumulate_survives_interrupt_and_resume() {
    let app = GraphBuilder::new()
        .add_node(NodeKind::Custom("before".into()), StepCounterNode)
        .add_node(
            NodeKind::Custom("ask".into()),
            CheckboxNode {
                options: vec!["a"],
            },
        )
        .add_node(NodeKind::Custom("after".into()), StepCounterNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("before".into()))
        .add_edge(NodeKind::Custom("before".into()), NodeKind::Custom("ask".into()))
        .add_edge(NodeKind::Custom("ask".into()), NodeKind::Custom("after".into()))
        .add_edge(NodeKind::Custom("after".into()), NodeKind::End)
        .add_accumulator("passes")
        .compile()
        .expect("valid graph");

    let mut runner = quiet_runner(app).await;
    runner
        .create_session("s".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();

    runner.run_until_settled("s").await.unwrap();
    let at_interrupt = runner
        .get_session("s")
        .unwrap()
        .state
        .accum
        .snapshot()["passes"]
        .clone();
    assert_eq!(at_interrupt, vec![json!(1)]);

    let outcome = runner.resume("s", json!(["a"])).await.unwrap();
    let state = outcome.into_state().expect("completed");
    assert_eq!(
        state.accum.snapshot()["passes"],
        vec![json!(1), json!(2)]
    );
}
