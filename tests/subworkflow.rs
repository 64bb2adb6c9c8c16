mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{count_events, quiet_runner};
use dialogweave::channels::Channel;
use dialogweave::graphs::GraphBuilder;
use dialogweave::interrupts::{InterruptKind, InterruptRequest};
use dialogweave::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use dialogweave::runtimes::RunOutcome;
use dialogweave::state::{Projection, StateSnapshot, VersionedState};
use dialogweave::subgraph::SubWorkflowNode;
use dialogweave::types::NodeKind;
use serde_json::json;
use std::time::Duration;

/// Child node that interrupts for a selection, then records it under
/// `result` together with the projected `seed` input.
struct InnerAskNode;

#[async_trait]
impl Node for InnerAskNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        if let Some(value) = ctx.resume_value() {
            let seed = snapshot.extra_str("seed").unwrap_or_default();
            return Ok(NodePartial::new()
                .with_extra_entry("result", json!(format!("{seed}:{}", value[0].as_str().unwrap_or(""))))
                .into());
        }
        Ok(NodeOutput::Interrupt(InterruptRequest::new(
            InterruptKind::Checkbox,
            json!({"options": ["x", "y"]}),
        )))
    }
}

/// Parent node recording that it observed the child's projected output.
struct AfterNode;

#[async_trait]
impl Node for AfterNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let result = snapshot.extra_str("result").unwrap_or_default();
        Ok(NodePartial::new()
            .with_extra_entry("observed", json!(result))
            .into())
    }
}

fn parent_app() -> dialogweave::app::App {
    let child = GraphBuilder::new()
        .add_node(NodeKind::Custom("inner_ask".into()), InnerAskNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("inner_ask".into()))
        .add_edge(NodeKind::Custom("inner_ask".into()), NodeKind::End)
        .with_input_projection(Projection::extra_keys(&["seed"]))
        .with_output_projection(Projection::extra_keys(&["result"]))
        .compile()
        .expect("valid child graph");

    GraphBuilder::new()
        .add_shared_node(
            NodeKind::Custom("child".into()),
            Arc::new(SubWorkflowNode::new("child", Arc::new(child))),
        )
        .add_node(NodeKind::Custom("after".into()), AfterNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("child".into()))
        .add_edge(NodeKind::Custom("child".into()), NodeKind::Custom("after".into()))
        .add_edge(NodeKind::Custom("after".into()), NodeKind::End)
        .compile()
        .expect("valid parent graph")
}

/// A child interrupt surfaces on the parent as a single interrupt event
/// tagged with the sub-workflow path, and resuming the parent routes the
/// value into the child node.
#[tokio::test]
async fn child_interrupt_propagates_and_resumes() {
    let mut runner = quiet_runner(parent_app()).await;
    let stream = runner.subscribe().expect("root runner owns a bus");

    let mut initial = VersionedState::new_with_user_message("go");
    initial.add_extra("seed", json!("s"));
    runner.create_session("p1".into(), initial).await.unwrap();

    let outcome = runner.run_until_settled("p1").await.unwrap();
    let token = match &outcome {
        RunOutcome::Interrupted(token) => token.clone(),
        RunOutcome::Completed(_) => panic!("expected child interrupt"),
    };
    assert!(token.is_subworkflow());
    assert_eq!(token.path, vec!["child".to_string(), "inner_ask".to_string()]);
    assert_eq!(token.node, NodeKind::Custom("inner_ask".into()));
    assert_eq!(token.resume_target(), NodeKind::Custom("child".into()));

    let events = stream.drain_until_end(Duration::from_secs(2)).await;
    // Exactly one interrupt event reaches the parent's consumer.
    assert_eq!(count_events(&events, "interrupt"), 1);
    // Child node activity is tagged as sub-workflow in origin.
    let subgraph_activity = events.iter().any(|e| {
        e.to_json_value()["data"]["subgraph"] == json!(true)
    });
    assert!(subgraph_activity);

    let outcome = runner.resume("p1", json!(["x"])).await.unwrap();
    let state = outcome.into_state().expect("completed after resume");
    let extra = state.extra.snapshot();
    // The resume value landed in the child node, whose projected output
    // flowed back into the parent.
    assert_eq!(extra["result"], json!("s:x"));
    assert_eq!(extra["observed"], json!("s:x"));
}

/// Parent and child share one checkpoint lineage.
#[tokio::test]
async fn child_history_lives_in_shared_checkpointer() {
    let mut runner = quiet_runner(parent_app()).await;
    let mut initial = VersionedState::new_with_user_message("go");
    initial.add_extra("seed", json!("s"));
    runner.create_session("p1".into(), initial).await.unwrap();
    runner.run_until_settled("p1").await.unwrap();
    runner.resume("p1", json!(["y"])).await.unwrap();

    let checkpointer = runner.checkpointer().unwrap();
    let mut sessions = checkpointer.list_sessions().await.unwrap();
    sessions.sort();
    assert_eq!(sessions, vec!["p1".to_string(), "p1/child".to_string()]);

    let child_history = checkpointer.load_history("p1/child").await.unwrap();
    assert!(child_history.len() >= 2);
    assert!(child_history.iter().any(|cp| cp.pending_interrupt.is_some()));
}
