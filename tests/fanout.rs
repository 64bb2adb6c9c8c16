mod common;

use std::sync::Arc;

use common::nodes::{AccumSleepNode, NoopNode};
use common::quiet_runner;
use dialogweave::channels::Channel;
use dialogweave::control::{RouteTarget, SendDirective};
use dialogweave::graphs::GraphBuilder;
use dialogweave::state::VersionedState;
use dialogweave::types::NodeKind;
use dialogweave::utils::collections::new_extra_map;
use serde_json::json;

/// Graph whose seed node fans out one `Send` per `(item, delay)` pair.
fn fanout_app(jobs: Vec<(i64, u64)>) -> dialogweave::app::App {
    GraphBuilder::new()
        .add_node(NodeKind::Custom("seed".into()), NoopNode)
        .add_node(NodeKind::Custom("worker".into()), AccumSleepNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("seed".into()))
        .add_conditional_edge(
            NodeKind::Custom("seed".into()),
            Arc::new(move |_| {
                if jobs.is_empty() {
                    return vec![RouteTarget::end()];
                }
                jobs.iter()
                    .map(|(item, delay)| {
                        let mut input = new_extra_map();
                        input.insert("item".into(), json!(item));
                        input.insert("delay_ms".into(), json!(delay));
                        RouteTarget::Send(SendDirective::new("worker", input))
                    })
                    .collect()
            }),
        )
        .add_edge(NodeKind::Custom("worker".into()), NodeKind::End)
        .add_accumulator("items")
        .compile()
        .expect("valid graph")
}

async fn run_fanout(jobs: Vec<(i64, u64)>) -> Vec<serde_json::Value> {
    let mut runner = quiet_runner(fanout_app(jobs)).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();
    let outcome = runner.run_until_settled("s1").await.unwrap();
    let state = outcome.into_state().expect("run completed");
    state
        .accum
        .snapshot()
        .get("items")
        .cloned()
        .unwrap_or_default()
}

/// Scenario C: three directives run concurrently, the batch completes
/// only when all have returned, and the merged list holds three entries
/// in directive order regardless of completion order.
#[tokio::test]
async fn three_sends_merge_in_directive_order() {
    // The first directive finishes last; order must still be declared
    // order, not completion order.
    let items = run_fanout(vec![(1, 60), (2, 20), (3, 0)]).await;
    assert_eq!(items, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn zero_sends_advance_as_noop() {
    let items = run_fanout(vec![]).await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn fanout_step_checkpoints_once() {
    let mut runner = quiet_runner(fanout_app(vec![(1, 0), (2, 0), (3, 0)])).await;
    runner
        .create_session("s1".into(), VersionedState::new_with_user_message("go"))
        .await
        .unwrap();
    runner.run_until_settled("s1").await.unwrap();

    let history = runner
        .checkpointer()
        .unwrap()
        .load_history("s1")
        .await
        .unwrap();
    // create + seed step + worker batch step.
    assert_eq!(history.len(), 3);
    let batch = &history[2];
    assert_eq!(batch.ran_nodes.len(), 3);
}

mod commutativity {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Merged state is identical for every simulated completion
        /// ordering of the batch.
        #[test]
        fn merge_is_completion_order_independent(
            delays in proptest::collection::vec(0u64..30, 4)
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_time()
                .build()
                .expect("runtime");
            let items = runtime.block_on(async {
                let jobs = delays
                    .iter()
                    .enumerate()
                    .map(|(i, delay)| (i as i64, *delay))
                    .collect();
                run_fanout(jobs).await
            });
            let expected: Vec<_> = (0..delays.len() as i64).map(|i| json!(i)).collect();
            prop_assert_eq!(items, expected);
        }
    }
}
