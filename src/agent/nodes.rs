//! Nodes and routers of the main conversational agent graph.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::schemas::{HitlOption, HitlPayload, ResearchReport};
use crate::channels::errors::{ErrorChain, ErrorEvent};
use crate::collaborators::{ChatModel, ModelRequest, Retriever};
use crate::control::RouteTarget;
use crate::interrupts::{InterruptKind, InterruptRequest};
use crate::message::{Message, ToolCall};
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::state::StateSnapshot;
use crate::tools::{DEEP_RESEARCH_TOOL, SAVE_REPORT_TOOL, ToolRegistry};
use crate::utils::id_generator::IdGenerator;

/// Extra-channel keys shared across the agent graph.
pub mod keys {
    /// RAG context injected by the retrieve node, consumed by the agent.
    pub const RAG_CONTEXT: &str = "rag_context";
    /// Research topic extracted from the sentinel tool call.
    pub const TOPIC: &str = "topic";
    /// Research depth (`quick`, `standard`, `deep`).
    pub const DEPTH: &str = "depth";
    /// The research sub-workflow's projected output.
    pub const REPORT: &str = "report";
    /// Report staged for external persistence after save confirmation.
    pub const PENDING_SAVE: &str = "pending_save";
    /// Namespace for the research sub-workflow's session lineage; fresh
    /// per research invocation, stable across its interrupts.
    pub const RESEARCH_RUN_ID: &str = "research_run_id";
}

/// Accumulate list of every report produced during the conversation.
pub const RESEARCH_REPORTS: &str = "research_reports";

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant with advanced research capabilities. \
You can:\n\
- Answer questions and have conversations\n\
- Get the current time and do calculations\n\
- Search the web with web_search for quick lookups\n\
- Create structured task plans with create_plan\n\
- Launch deep research investigations with deep_research (spawns parallel searches, produces structured reports)\n\
- Save research reports to the database with save_report\n\n\
When a user asks for in-depth research on a topic, use the deep_research tool. \
For quick factual lookups, use web_search. \
Be concise and helpful in your responses.";

/// Scan the conversation backwards for the most recent call of a tool.
fn last_tool_call<'a>(messages: &'a [Message], name: &str) -> Option<&'a ToolCall> {
    messages
        .iter()
        .rev()
        .find_map(|message| message.tool_call_named(name))
}

/// Context-injection node: query the retriever and stage the top chunks
/// for the agent's system prompt. Retrieval failures degrade to an empty
/// context with an error event, never a failed step.
pub struct RetrieveNode {
    retriever: Option<Arc<dyn Retriever>>,
    top_k: usize,
}

impl RetrieveNode {
    pub fn new(retriever: Option<Arc<dyn Retriever>>) -> Self {
        Self { retriever, top_k: 3 }
    }
}

#[async_trait]
impl Node for RetrieveNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let Some(retriever) = &self.retriever else {
            return Ok(NodePartial::new().into());
        };
        let Some(query) = snapshot
            .messages
            .iter()
            .rev()
            .find(|m| m.has_role(Message::USER))
            .map(|m| m.content.clone())
        else {
            return Ok(NodePartial::new().into());
        };
        if query.is_empty() {
            return Ok(NodePartial::new().into());
        }

        match retriever.retrieve(&query, self.top_k).await {
            Ok(chunks) if !chunks.is_empty() => {
                ctx.emit("retrieve", format!("injecting {} chunks", chunks.len()))?;
                let context = chunks
                    .iter()
                    .map(|chunk| format!("[Source: {}]\n{}", chunk.source, chunk.content))
                    .collect::<Vec<_>>()
                    .join("\n\n---\n\n");
                Ok(NodePartial::new()
                    .with_extra_entry(keys::RAG_CONTEXT, json!(context))
                    .into())
            }
            Ok(_) => Ok(NodePartial::new().into()),
            Err(e) => Ok(NodePartial::new()
                .with_errors(vec![
                    ErrorEvent::node("retrieve", ctx.step, ErrorChain::msg(e.to_string()))
                        .with_tag("retrieval"),
                ])
                .into()),
        }
    }
}

/// The main reasoning node: calls the model with the full tool surface
/// (sentinels included) and streams content deltas as it generates.
pub struct AgentNode {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
}

impl AgentNode {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self { model, tools }
    }

    fn system_message(snapshot: &StateSnapshot) -> Message {
        match snapshot.extra_str(keys::RAG_CONTEXT) {
            Some(context) if !context.is_empty() => Message::system(&format!(
                "{SYSTEM_PROMPT}\n\n\
                 Use the following context from uploaded documents to help answer \
                 the user's question. If the context is not relevant, you can ignore it.\n\n\
                 Context:\n{context}"
            )),
            _ => Message::system(SYSTEM_PROMPT),
        }
    }
}

#[async_trait]
impl Node for AgentNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let mut messages = Vec::with_capacity(snapshot.messages.len() + 1);
        if !snapshot.messages.iter().any(|m| m.has_role(Message::SYSTEM)) {
            messages.push(Self::system_message(&snapshot));
        }
        messages.extend(snapshot.messages.iter().cloned());

        let request = ModelRequest::new(messages).with_tools(self.tools.schemas());
        let message_id = IdGenerator::new().generate_message_id();

        // Forward cumulative content deltas to the event stream while the
        // model generates.
        let (tx, rx) = flume::unbounded::<String>();
        let forward = {
            let ctx = ctx.clone();
            let message_id = message_id.clone();
            tokio::spawn(async move {
                let mut accumulated = String::new();
                while let Ok(delta) = rx.recv_async().await {
                    accumulated.push_str(&delta);
                    let _ = ctx.emit_message_partial(&message_id, &accumulated);
                }
            })
        };

        let response = self.model.generate(request, Some(tx)).await?;
        let _ = forward.await;

        ctx.emit_message_complete(&message_id, &response.content, response.tool_calls.clone())?;

        let reply = Message::assistant_with_tool_calls(&response.content, response.tool_calls)
            .with_id(&message_id);
        Ok(NodePartial::new().with_messages(vec![reply]).into())
    }
}

/// Executes the non-sentinel tool calls of the last assistant turn.
/// Tool failures become tool-message content, not step failures.
pub struct ToolsNode {
    tools: Arc<ToolRegistry>,
}

impl ToolsNode {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Node for ToolsNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let Some(last) = snapshot.last_message() else {
            return Err(NodeError::MissingInput {
                what: "assistant message with tool calls",
            });
        };

        let mut results = Vec::new();
        for call in &last.tool_calls {
            if self.tools.is_sentinel(&call.name) {
                continue;
            }
            ctx.emit("tools", format!("invoking {}", call.name))?;
            let content = match self.tools.invoke(&call.name, call.args.clone()).await {
                Ok(output) => output,
                Err(e) => format!("Error: {e}"),
            };
            let message_id = IdGenerator::new().generate_message_id();
            ctx.emit_message_complete(&message_id, &content, Vec::new())?;
            results.push(Message::tool(&content, &call.id, &call.name).with_id(&message_id));
        }

        Ok(NodePartial::new().with_messages(results).into())
    }
}

/// Where the agent's last turn routes next. Sentinel tool calls are
/// recognized by name from a typed inspection of the message, keeping the
/// set of control-flow branches closed and exhaustively checkable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentRoute {
    Tools,
    DeepResearch,
    SaveConfirm,
    End,
}

impl AgentRoute {
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let Some(last) = snapshot.last_message() else {
            return AgentRoute::End;
        };
        if !last.has_role(Message::ASSISTANT) || last.tool_calls.is_empty() {
            return AgentRoute::End;
        }
        if last.tool_call_named(DEEP_RESEARCH_TOOL).is_some() {
            return AgentRoute::DeepResearch;
        }
        if last.tool_call_named(SAVE_REPORT_TOOL).is_some() {
            return AgentRoute::SaveConfirm;
        }
        AgentRoute::Tools
    }
}

/// Router after the agent node.
pub fn agent_route(snapshot: StateSnapshot) -> Vec<RouteTarget> {
    match AgentRoute::from_snapshot(&snapshot) {
        AgentRoute::Tools => vec![RouteTarget::to("tools")],
        AgentRoute::DeepResearch => vec![RouteTarget::to("prepare_research")],
        AgentRoute::SaveConfirm => vec![RouteTarget::to("save_confirm")],
        AgentRoute::End => vec![RouteTarget::end()],
    }
}

/// Extracts the research request from the `deep_research` sentinel call.
///
/// Extraction failure is the observed recovery path: the node answers the
/// tool call with an explanatory message and clears the topic, and the
/// router sends the run back to the agent instead of failing it.
pub struct PrepareResearchNode;

#[async_trait]
impl Node for PrepareResearchNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let call = last_tool_call(&snapshot.messages, DEEP_RESEARCH_TOOL);
        let topic = call
            .and_then(|c| c.args.get("topic"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let depth = call
            .and_then(|c| c.args.get("depth"))
            .and_then(Value::as_str)
            .unwrap_or("standard")
            .to_string();

        if topic.is_empty() {
            let call_id = call.map(|c| c.id.as_str()).unwrap_or("unknown");
            return Ok(NodePartial::new()
                .with_messages(vec![Message::tool(
                    "No research topic provided.",
                    call_id,
                    DEEP_RESEARCH_TOOL,
                )])
                .with_extra_entry(keys::TOPIC, json!(""))
                .into());
        }

        ctx.emit("research", format!("preparing research on '{topic}'"))?;
        Ok(NodePartial::new()
            .with_extra_entry(keys::TOPIC, json!(topic))
            .with_extra_entry(keys::DEPTH, json!(depth))
            .with_extra_entry(
                keys::RESEARCH_RUN_ID,
                json!(IdGenerator::new().generate_message_id()),
            )
            .into())
    }
}

/// Router after research preparation: run the sub-workflow when a topic
/// was extracted, otherwise recover back to the agent.
pub fn research_entry_route(snapshot: StateSnapshot) -> Vec<RouteTarget> {
    let has_topic = snapshot
        .extra_str(keys::TOPIC)
        .map(|t| !t.is_empty())
        .unwrap_or(false);
    if has_topic {
        vec![RouteTarget::to("deep_research")]
    } else {
        vec![RouteTarget::to("agent")]
    }
}

/// Turns the sub-workflow's report into the sentinel call's tool result
/// and appends it to the conversation's accumulated reports.
pub struct ProcessResearchResultNode;

#[async_trait]
impl Node for ProcessResearchResultNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let call_id = last_tool_call(&snapshot.messages, DEEP_RESEARCH_TOOL)
            .map(|c| c.id.clone())
            .unwrap_or_default();

        let report_value = snapshot.extra.get(keys::REPORT).cloned();
        let report: Option<ResearchReport> = report_value
            .as_ref()
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let content = match &report {
            Some(report) => {
                let mut parts = vec![format!(
                    "**Research Report: {}**\n\n{}\n\n**Key Findings:**",
                    report.title, report.summary
                )];
                for (i, finding) in report.key_findings.iter().enumerate() {
                    parts.push(format!("{}. {}", i + 1, finding.insight));
                }
                if !report.sources.is_empty() {
                    parts.push(format!(
                        "\n\n**Sources:** {} sources referenced",
                        report.sources.len()
                    ));
                }
                parts.join("\n")
            }
            None => "Research completed but no report was generated.".to_string(),
        };

        let mut partial = NodePartial::new().with_messages(vec![Message::tool(
            &content,
            &call_id,
            DEEP_RESEARCH_TOOL,
        )]);
        if let Some(value) = report_value.filter(|v| !v.is_null()) {
            partial = partial.with_accum_entries(RESEARCH_REPORTS, vec![value]);
        }
        Ok(partial.into())
    }
}

/// Save-confirmation node: raises the confirm interrupt, then on resume
/// stages the chosen report under `pending_save` (or answers the tool
/// call with a cancellation).
pub struct SaveConfirmNode;

impl SaveConfirmNode {
    fn selected_report(snapshot: &StateSnapshot) -> Option<Value> {
        let reports = snapshot.accum_list(RESEARCH_REPORTS);
        if reports.is_empty() {
            return None;
        }
        let requested = last_tool_call(&snapshot.messages, SAVE_REPORT_TOOL)
            .and_then(|c| c.args.get("report_index"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        // Index 0 is the most recent report.
        let idx = requested.min(reports.len() - 1);
        reports.get(reports.len() - 1 - idx).cloned()
    }

    fn save_call_id(snapshot: &StateSnapshot) -> String {
        last_tool_call(&snapshot.messages, SAVE_REPORT_TOOL)
            .map(|c| c.id.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Node for SaveConfirmNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        if let Some(value) = ctx.resume_value() {
            let action = match value {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("action")
                    .and_then(Value::as_str)
                    .unwrap_or("cancel")
                    .to_string(),
                _ => "cancel".to_string(),
            };
            if action == "save" {
                let report = Self::selected_report(&snapshot).unwrap_or(Value::Null);
                return Ok(NodePartial::new()
                    .with_extra_entry(keys::PENDING_SAVE, report)
                    .into());
            }
            return Ok(NodePartial::new()
                .with_messages(vec![Message::tool(
                    "Report save cancelled by user.",
                    &Self::save_call_id(&snapshot),
                    SAVE_REPORT_TOOL,
                )])
                .with_extra_entry(keys::PENDING_SAVE, Value::Null)
                .into());
        }

        let Some(report_value) = Self::selected_report(&snapshot) else {
            return Ok(NodePartial::new()
                .with_messages(vec![Message::tool(
                    "No research reports available to save. Run a deep research first.",
                    &Self::save_call_id(&snapshot),
                    SAVE_REPORT_TOOL,
                )])
                .with_extra_entry(keys::PENDING_SAVE, Value::Null)
                .into());
        };

        let report: Option<ResearchReport> = serde_json::from_value(report_value).ok();
        let payload = HitlPayload {
            hitl_type: "confirm".into(),
            title: "Save Research Report".into(),
            message: "Do you want to save this research report to the database?".into(),
            options: vec![
                HitlOption::new("save", "Save").with_description("Save report to database"),
                HitlOption::new("cancel", "Cancel").with_description("Don't save"),
            ],
            report,
        };
        Ok(NodeOutput::Interrupt(InterruptRequest::new(
            InterruptKind::Confirm,
            serde_json::to_value(payload)?,
        )))
    }
}

/// Router after save confirmation.
pub fn save_confirm_route(snapshot: StateSnapshot) -> Vec<RouteTarget> {
    let pending = snapshot
        .extra
        .get(keys::PENDING_SAVE)
        .map(|v| !v.is_null())
        .unwrap_or(false);
    if pending {
        vec![RouteTarget::to("save_to_db")]
    } else {
        vec![RouteTarget::to("agent")]
    }
}

/// Answers the save tool call once a report is staged. The actual write
/// belongs to an external store that reads `pending_save` from final
/// state; this engine's responsibility ends at producing the value.
pub struct SaveToDbNode;

#[async_trait]
impl Node for SaveToDbNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let call_id = SaveConfirmNode::save_call_id(&snapshot);
        let pending = snapshot
            .extra
            .get(keys::PENDING_SAVE)
            .filter(|v| !v.is_null());

        let Some(pending) = pending else {
            return Ok(NodePartial::new()
                .with_messages(vec![Message::tool(
                    "No report to save.",
                    &call_id,
                    SAVE_REPORT_TOOL,
                )])
                .into());
        };

        let title = pending
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled Report");
        let content = serde_json::to_string(&json!({
            "status": "saved",
            "title": title,
            "message": format!("Research report '{title}' has been saved to the database."),
        }))?;
        Ok(NodePartial::new()
            .with_messages(vec![Message::tool(&content, &call_id, SAVE_REPORT_TOOL)])
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VersionedState;

    fn snapshot_with_last(message: Message) -> StateSnapshot {
        VersionedState::new_with_messages(vec![Message::user("hi"), message]).snapshot()
    }

    #[test]
    fn agent_route_detects_sentinels() {
        let plain = snapshot_with_last(Message::assistant("done"));
        assert_eq!(AgentRoute::from_snapshot(&plain), AgentRoute::End);

        let tools = snapshot_with_last(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("1", "calculator", json!({"expression": "1+1"}))],
        ));
        assert_eq!(AgentRoute::from_snapshot(&tools), AgentRoute::Tools);

        let research = snapshot_with_last(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("2", DEEP_RESEARCH_TOOL, json!({"topic": "rust"}))],
        ));
        assert_eq!(
            AgentRoute::from_snapshot(&research),
            AgentRoute::DeepResearch
        );

        let save = snapshot_with_last(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("3", SAVE_REPORT_TOOL, json!({}))],
        ));
        assert_eq!(AgentRoute::from_snapshot(&save), AgentRoute::SaveConfirm);
    }

    #[test]
    fn research_entry_route_recovers_without_topic() {
        let mut state = VersionedState::new_with_user_message("hi");
        state.add_extra(keys::TOPIC, json!(""));
        assert_eq!(
            research_entry_route(state.snapshot()),
            vec![RouteTarget::to("agent")]
        );

        state.add_extra(keys::TOPIC, json!("rust async"));
        assert_eq!(
            research_entry_route(state.snapshot()),
            vec![RouteTarget::to("deep_research")]
        );
    }

    #[test]
    fn save_confirm_route_follows_pending_save() {
        let mut state = VersionedState::new_with_user_message("hi");
        state.add_extra(keys::PENDING_SAVE, Value::Null);
        assert_eq!(
            save_confirm_route(state.snapshot()),
            vec![RouteTarget::to("agent")]
        );

        state.add_extra(keys::PENDING_SAVE, json!({"title": "T"}));
        assert_eq!(
            save_confirm_route(state.snapshot()),
            vec![RouteTarget::to("save_to_db")]
        );
    }
}
