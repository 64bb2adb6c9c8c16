mod common;

use std::sync::Arc;

use common::nodes::{NoopNode, SimpleMessageNode};
use dialogweave::control::RouteTarget;
use dialogweave::graphs::{GraphBuilder, GraphCompileError};
use dialogweave::types::NodeKind;

#[test]
fn compile_rejects_empty_graph() {
    let result = GraphBuilder::new().compile();
    assert!(matches!(result, Err(GraphCompileError::EmptyGraph)));
}

#[test]
fn compile_rejects_edge_to_undeclared_node() {
    let result = GraphBuilder::new()
        .add_node(NodeKind::Custom("a".into()), NoopNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("a".into()))
        .add_edge(NodeKind::Custom("a".into()), NodeKind::Custom("ghost".into()))
        .compile();
    match result {
        Err(GraphCompileError::UnknownNode { from, to }) => {
            assert_eq!(from, "a");
            assert_eq!(to, "ghost");
        }
        other => panic!("expected UnknownNode, got {:?}", other.err()),
    }
}

#[test]
fn compile_rejects_missing_entry_point() {
    let result = GraphBuilder::new()
        .add_node(NodeKind::Custom("a".into()), NoopNode)
        .add_edge(NodeKind::Custom("a".into()), NodeKind::End)
        .compile();
    assert!(matches!(result, Err(GraphCompileError::NoEntryPoint)));
}

#[test]
fn compile_rejects_conditional_from_undeclared_node() {
    let result = GraphBuilder::new()
        .add_node(NodeKind::Custom("a".into()), NoopNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("a".into()))
        .add_conditional_edge(
            NodeKind::Custom("ghost".into()),
            Arc::new(|_| vec![RouteTarget::end()]),
        )
        .compile();
    assert!(matches!(
        result,
        Err(GraphCompileError::UnknownConditionalSource { .. })
    ));
}

#[test]
fn compile_accepts_cycles() {
    // Cycles are legal; the step ceiling bounds them at runtime.
    let app = GraphBuilder::new()
        .add_node(NodeKind::Custom("a".into()), SimpleMessageNode::new("hi"))
        .add_node(NodeKind::Custom("b".into()), NoopNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("a".into()))
        .add_edge(NodeKind::Custom("a".into()), NodeKind::Custom("b".into()))
        .add_edge(NodeKind::Custom("b".into()), NodeKind::Custom("a".into()))
        .add_conditional_edge(
            NodeKind::Custom("b".into()),
            Arc::new(|_| vec![RouteTarget::end()]),
        )
        .add_accumulator("items")
        .compile()
        .expect("graph should compile");

    assert_eq!(app.accumulators(), &["items".to_string()]);
    assert_eq!(app.nodes().len(), 2);
}
