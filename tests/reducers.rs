use std::sync::Arc;

use dialogweave::channels::Channel;
use dialogweave::channels::errors::{ErrorChain, ErrorEvent};
use dialogweave::message::Message;
use dialogweave::node::NodePartial;
use dialogweave::reducers::ReducerRegistry;
use dialogweave::state::VersionedState;
use serde_json::json;

fn registry() -> ReducerRegistry {
    ReducerRegistry::for_schema(Arc::new(vec!["reports".to_string()]))
}

#[test]
fn messages_append_and_extra_replaces() {
    let mut state = VersionedState::new_with_user_message("hi");
    state.add_extra("model", json!("mini"));

    let partial = NodePartial::new()
        .with_messages(vec![Message::assistant("hello")])
        .with_extra_entry("model", json!("large"))
        .with_extra_entry("topic", json!("rust"));

    registry().apply_all(&mut state, &partial).unwrap();

    assert_eq!(state.messages.len(), 2);
    let extra = state.extra.snapshot();
    assert_eq!(extra["model"], json!("large"));
    assert_eq!(extra["topic"], json!("rust"));
}

#[test]
fn accumulate_appends_without_removing() {
    let mut state = VersionedState::builder()
        .with_accum_entry("reports", json!({"title": "first"}))
        .build();

    let partial = NodePartial::new().with_accum_entries("reports", vec![json!({"title": "second"})]);
    registry().apply_all(&mut state, &partial).unwrap();

    let lists = state.accum.snapshot();
    assert_eq!(lists["reports"].len(), 2);
    assert_eq!(lists["reports"][0]["title"], "first");
    assert_eq!(lists["reports"][1]["title"], "second");
}

#[test]
fn errors_accumulate() {
    let mut state = VersionedState::new_with_user_message("hi");
    let partial = NodePartial::new().with_errors(vec![ErrorEvent::node(
        "explorer",
        1,
        ErrorChain::msg("search failed"),
    )]);
    registry().apply_all(&mut state, &partial).unwrap();
    registry().apply_all(&mut state, &partial).unwrap();
    assert_eq!(state.errors.len(), 2);
}

#[test]
fn empty_partial_is_a_noop() {
    let mut state = VersionedState::new_with_user_message("hi");
    let before = state.clone();
    registry()
        .apply_all(&mut state, &NodePartial::default())
        .unwrap();
    assert_eq!(state, before);
}
