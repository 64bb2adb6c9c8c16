//! End-to-end flows of the deep-research agent against scripted
//! collaborators.

mod common;

use std::sync::Arc;

use common::collaborators::{ScriptedModel, StaticRetriever, StubSearch};
use common::quiet_runner;
use dialogweave::agent::build_agent_workflow;
use dialogweave::channels::Channel;
use dialogweave::collaborators::{ModelResponse, RetrievedChunk};
use dialogweave::interrupts::InterruptKind;
use dialogweave::message::{Message, ToolCall};
use dialogweave::runtimes::AppRunner;
use dialogweave::state::VersionedState;
use serde_json::json;

async fn agent_runner(model: Arc<ScriptedModel>) -> AppRunner {
    let retriever = StaticRetriever {
        chunks: vec![RetrievedChunk {
            content: "Rust 1.0 shipped in 2015.".into(),
            source: "notes.md".into(),
            score: 0.8,
        }],
    };
    let app = build_agent_workflow(model, Arc::new(StubSearch), Some(Arc::new(retriever)))
        .expect("agent graph compiles");
    quiet_runner(app).await
}

#[tokio::test]
async fn plain_chat_turn_completes() {
    let model = Arc::new(ScriptedModel::new());
    model.push_response(ModelResponse::text("Hello! How can I help?"));

    let mut runner = agent_runner(model).await;
    runner
        .create_session("t1".into(), VersionedState::new_with_user_message("hi"))
        .await
        .unwrap();
    let outcome = runner.run_until_settled("t1").await.unwrap();

    let state = outcome.into_state().expect("completed");
    let messages = state.messages.snapshot();
    let last = messages.last().unwrap();
    assert!(last.has_role(Message::ASSISTANT));
    assert_eq!(last.content, "Hello! How can I help?");
    assert!(last.id.is_some());
    // The retrieve node staged context for the agent's system prompt.
    assert!(
        state.extra.snapshot()["rag_context"]
            .as_str()
            .unwrap()
            .contains("notes.md")
    );
}

#[tokio::test]
async fn tool_loop_executes_calculator() {
    let model = Arc::new(ScriptedModel::new());
    model.push_response(ModelResponse::tool_calls(vec![ToolCall::new(
        "call-1",
        "calculator",
        json!({"expression": "6 * 7"}),
    )]));
    model.push_response(ModelResponse::text("The answer is 42."));

    let mut runner = agent_runner(model).await;
    runner
        .create_session("t1".into(), VersionedState::new_with_user_message("6*7?"))
        .await
        .unwrap();
    let outcome = runner.run_until_settled("t1").await.unwrap();

    let state = outcome.into_state().expect("completed");
    let messages = state.messages.snapshot();
    let tool_msg = messages
        .iter()
        .find(|m| m.has_role(Message::TOOL))
        .expect("tool result recorded");
    assert_eq!(tool_msg.content, "42");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(messages.last().unwrap().content, "The answer is 42.");
}

#[tokio::test]
async fn missing_topic_recovers_back_to_agent() {
    let model = Arc::new(ScriptedModel::new());
    model.push_response(ModelResponse::tool_calls(vec![ToolCall::new(
        "call-1",
        "deep_research",
        json!({}),
    )]));
    model.push_response(ModelResponse::text("I need a topic to research."));

    let mut runner = agent_runner(model).await;
    runner
        .create_session("t1".into(), VersionedState::new_with_user_message("research"))
        .await
        .unwrap();
    let outcome = runner.run_until_settled("t1").await.unwrap();

    let state = outcome.into_state().expect("recovered without interrupting");
    let messages = state.messages.snapshot();
    assert!(
        messages
            .iter()
            .any(|m| m.content == "No research topic provided.")
    );
    assert_eq!(messages.last().unwrap().content, "I need a topic to research.");
}

/// The full three-interrupt conversation: deep research (sub-topic
/// selection, report review) followed by a save confirmation in a second
/// turn.
#[tokio::test]
async fn deep_research_and_save_flow() {
    let model = Arc::new(ScriptedModel::new());
    // Turn 1: agent launches research, then summarizes the result.
    model.push_response(ModelResponse::tool_calls(vec![ToolCall::new(
        "call-research",
        "deep_research",
        json!({"topic": "rust history", "depth": "quick"}),
    )]));
    model.push_response(ModelResponse::text("Research finished — see the report."));
    // Turn 2: agent saves the report, then confirms.
    model.push_response(ModelResponse::tool_calls(vec![ToolCall::new(
        "call-save",
        "save_report",
        json!({"report_index": 0}),
    )]));
    model.push_response(ModelResponse::text("Saved!"));

    // Structured outputs: clarify, orchestrate, synthesize.
    model.push_structured(json!({"topics": ["Origins", "Adoption"]}));
    model.push_structured(json!({"instructions": [{
        "query": "rust language origins",
        "search_focus": "early history",
        "context": ""
    }]}));
    model.push_structured(json!({
        "title": "A Short History of Rust",
        "summary": "From research project to mainstream systems language.",
        "key_findings": [{
            "insight": "Rust 1.0 shipped in 2015.",
            "evidence": "Release notes",
            "sources": ["https://example.com/rust-history"]
        }],
        "sources": ["https://example.com/rust-history"],
        "tags": ["rust", "history"],
        "methodology": "Web search and synthesis"
    }));

    let mut runner = agent_runner(model).await;
    runner
        .create_session(
            "thread".into(),
            VersionedState::new_with_user_message("research rust history"),
        )
        .await
        .unwrap();

    // Interrupt #1: sub-topic selection inside the sub-workflow.
    let outcome = runner.run_until_settled("thread").await.unwrap();
    let token = outcome.interrupt().expect("clarify interrupt").clone();
    assert_eq!(token.kind, InterruptKind::Checkbox);
    assert_eq!(token.path, vec!["deep_research", "clarify"]);
    assert_eq!(token.payload["options"][0]["label"], "Origins");

    // Interrupt #2: report review.
    let outcome = runner.resume("thread", json!(["topic_0"])).await.unwrap();
    let token = outcome.interrupt().expect("review interrupt").clone();
    assert_eq!(token.kind, InterruptKind::Review);
    assert_eq!(token.path, vec!["deep_research", "review"]);
    assert_eq!(token.payload["report"]["title"], "A Short History of Rust");

    // Approving completes the research turn.
    let outcome = runner
        .resume("thread", json!({"action": "approve"}))
        .await
        .unwrap();
    let state = outcome.into_state().expect("turn 1 completed");
    let reports = state.accum.snapshot()["research_reports"].clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["title"], "A Short History of Rust");
    assert!(
        state
            .messages
            .snapshot()
            .iter()
            .any(|m| m.has_role(Message::TOOL)
                && m.content.contains("**Research Report: A Short History of Rust**"))
    );

    // Turn 2: ask to save. Interrupt #3: confirmation.
    runner
        .create_session(
            "thread".into(),
            VersionedState::new_with_user_message("save it"),
        )
        .await
        .unwrap();
    let outcome = runner.run_until_settled("thread").await.unwrap();
    let token = outcome.interrupt().expect("save confirmation").clone();
    assert_eq!(token.kind, InterruptKind::Confirm);
    assert_eq!(token.path, vec!["save_confirm"]);

    let outcome = runner
        .resume("thread", json!({"action": "save"}))
        .await
        .unwrap();
    let state = outcome.into_state().expect("turn 2 completed");
    let extra = state.extra.snapshot();
    // The finalized value is staged for the external store.
    assert_eq!(extra["pending_save"]["title"], "A Short History of Rust");
    let messages = state.messages.snapshot();
    assert!(
        messages
            .iter()
            .any(|m| m.has_role(Message::TOOL) && m.content.contains("\"status\":\"saved\""))
    );
    assert_eq!(messages.last().unwrap().content, "Saved!");
    // The accumulated reports were not disturbed by the second turn.
    assert_eq!(state.accum.snapshot()["research_reports"].len(), 1);
}

/// Cancelling the save keeps the report out of `pending_save` and answers
/// the tool call instead.
#[tokio::test]
async fn save_flow_can_be_cancelled() {
    let model = Arc::new(ScriptedModel::new());
    model.push_response(ModelResponse::tool_calls(vec![ToolCall::new(
        "call-save",
        "save_report",
        json!({}),
    )]));
    model.push_response(ModelResponse::text("Okay, not saving."));

    let mut runner = agent_runner(model).await;
    let initial = VersionedState::builder()
        .with_user_message("save the report")
        .with_accum_entry("research_reports", json!({"title": "Existing", "summary": "s"}))
        .build();
    runner.create_session("t1".into(), initial).await.unwrap();

    let outcome = runner.run_until_settled("t1").await.unwrap();
    assert!(outcome.interrupt().is_some());

    let outcome = runner
        .resume("t1", json!({"action": "cancel"}))
        .await
        .unwrap();
    let state = outcome.into_state().expect("completed");
    assert!(state.extra.snapshot()["pending_save"].is_null());
    assert!(
        state
            .messages
            .snapshot()
            .iter()
            .any(|m| m.content == "Report save cancelled by user.")
    );
}
