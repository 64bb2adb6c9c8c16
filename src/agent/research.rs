//! The deep-research sub-workflow.
//!
//! `clarify -> orchestrate -> explorer (parallel fan-out) -> synthesize ->
//! review`, with two human interrupts: sub-topic selection (checkbox) in
//! `clarify` and report review (approve/edit/redo) in `review`. A redo
//! loops back to `orchestrate`; the runner's step ceiling bounds the loop.
//!
//! Embedded in the parent graph through projections: `{topic, depth}` in,
//! `{report}` out. Everything else here is internal state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::nodes::keys;
use super::schemas::{
    ExplorerInstruction, HitlOption, HitlPayload, INSTRUCTION_LIST_SCHEMA, InstructionList,
    RESEARCH_REPORT_SCHEMA, ResearchReport, SUB_TOPIC_LIST_SCHEMA, SubTopicList,
};
use crate::app::App;
use crate::collaborators::{ChatModel, ModelRequest, SearchResult, WebSearch};
use crate::control::{RouteTarget, SendDirective};
use crate::graphs::{GraphBuilder, GraphCompileError};
use crate::interrupts::{InterruptKind, InterruptRequest};
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::state::{Projection, StateSnapshot};
use crate::types::NodeKind;
use crate::utils::collections::new_extra_map;

/// Internal extra-channel keys of the research sub-workflow.
pub mod research_keys {
    /// Sub-topics the human selected (or all suggestions when none).
    pub const CLARIFIED_TOPICS: &str = "clarified_topics";
    /// Instructions driving the explorer fan-out.
    pub const EXPLORER_INSTRUCTIONS: &str = "explorer_instructions";
    /// Progress marker: `clarified`, `orchestrated`, `synthesized`,
    /// `approved`, `redo`.
    pub const STATUS: &str = "status";
    /// Per-explorer overlay keys.
    pub const QUERY: &str = "query";
    pub const SEARCH_FOCUS: &str = "search_focus";
    pub const CONTEXT: &str = "context";
}

/// Accumulate list of raw search results across all explorers (and across
/// redo rounds).
pub const SEARCH_RESULTS: &str = "search_results";

/// How many parallel explorers a depth buys.
pub fn depth_to_explorers(depth: &str) -> usize {
    match depth {
        "quick" => 3,
        "deep" => 8,
        _ => 5,
    }
}

/// Suggests sub-topics, then suspends for the human to pick via
/// checkboxes. On resume the selection is mapped back to topic labels
/// using the payload computed before the suspension — the model is not
/// called a second time.
pub struct ClarifyNode {
    model: Arc<dyn ChatModel>,
}

impl ClarifyNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for ClarifyNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        if let Some(value) = ctx.resume_value() {
            let selected_ids: Vec<&str> = value
                .as_array()
                .map(|ids| ids.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let payload: HitlPayload = ctx
                .resume_payload()
                .cloned()
                .map(serde_json::from_value)
                .transpose()?
                .unwrap_or_default();

            let mut selected: Vec<String> = payload
                .options
                .iter()
                .filter(|opt| selected_ids.contains(&opt.id.as_str()))
                .map(|opt| opt.label.clone())
                .collect();
            // Nothing selected means research everything suggested.
            if selected.is_empty() {
                selected = payload.options.iter().map(|opt| opt.label.clone()).collect();
            }

            return Ok(NodePartial::new()
                .with_extra_entry(research_keys::CLARIFIED_TOPICS, json!(selected))
                .with_extra_entry(research_keys::STATUS, json!("clarified"))
                .into());
        }

        let topic = snapshot.extra_str(keys::TOPIC).unwrap_or_default().to_string();
        ctx.emit("clarify", format!("suggesting sub-topics for '{topic}'"))?;

        let request = ModelRequest::new(vec![Message::user(&format!(
            "Given the research topic: '{topic}'\n\n\
             Suggest 5-8 specific sub-topics or angles to investigate."
        ))]);
        let raw = self
            .model
            .generate_structured(request, SUB_TOPIC_LIST_SCHEMA)
            .await?;
        let subtopics: SubTopicList = serde_json::from_value(raw)?;

        let options: Vec<HitlOption> = subtopics
            .topics
            .iter()
            .enumerate()
            .map(|(i, label)| HitlOption::new(format!("topic_{i}"), label.clone()).preselected())
            .collect();
        let payload = HitlPayload {
            hitl_type: "checkbox".into(),
            title: "Select Research Topics".into(),
            message: format!(
                "The following sub-topics were identified for '{topic}'. \
                 Select the ones you'd like to research:"
            ),
            options,
            report: None,
        };

        Ok(NodeOutput::Interrupt(InterruptRequest::new(
            InterruptKind::Checkbox,
            serde_json::to_value(payload)?,
        )))
    }
}

/// Generates one search instruction per explorer via structured output.
pub struct OrchestrateNode {
    model: Arc<dyn ChatModel>,
}

impl OrchestrateNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for OrchestrateNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let topics: Vec<String> = snapshot
            .extra
            .get(research_keys::CLARIFIED_TOPICS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let depth = snapshot.extra_str(keys::DEPTH).unwrap_or("standard");
        let num_explorers = topics.len().min(depth_to_explorers(depth));

        ctx.emit(
            "orchestrate",
            format!("creating {num_explorers} explorer instructions"),
        )?;

        let topic_lines = topics
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let request = ModelRequest::new(vec![Message::user(&format!(
            "You are creating search instructions for {num_explorers} parallel web researchers.\n\n\
             Research topics to cover:\n{topic_lines}\n\n\
             Create exactly {num_explorers} search instructions. Each should have:\n\
             - A specific, well-crafted search query for web search\n\
             - A clear search focus describing what to look for\n\
             - Optional context for the researcher"
        ))]);
        let raw = self
            .model
            .generate_structured(request, INSTRUCTION_LIST_SCHEMA)
            .await?;
        let mut instructions: InstructionList = serde_json::from_value(raw)?;
        instructions.instructions.truncate(num_explorers);

        Ok(NodePartial::new()
            .with_extra_entry(
                research_keys::EXPLORER_INSTRUCTIONS,
                serde_json::to_value(&instructions.instructions)?,
            )
            .with_extra_entry(research_keys::STATUS, json!("orchestrated"))
            .into())
    }
}

/// Fan-out router: one `Send` per explorer instruction. With no
/// instructions the step advances straight to synthesis as a no-op.
pub fn route_to_explorers(snapshot: StateSnapshot) -> Vec<RouteTarget> {
    let instructions: Vec<ExplorerInstruction> = snapshot
        .extra
        .get(research_keys::EXPLORER_INSTRUCTIONS)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    if instructions.is_empty() {
        return vec![RouteTarget::to("synthesize")];
    }

    instructions
        .into_iter()
        .map(|instruction| {
            let mut input = new_extra_map();
            input.insert(research_keys::QUERY.into(), json!(instruction.query));
            input.insert(
                research_keys::SEARCH_FOCUS.into(),
                json!(instruction.search_focus),
            );
            input.insert(research_keys::CONTEXT.into(), json!(instruction.context));
            RouteTarget::Send(SendDirective::new("explorer", input))
        })
        .collect()
}

/// One parallel researcher: runs its assigned web search and accumulates
/// the hits. Search failures degrade to an error-shaped result entry.
pub struct ExplorerNode {
    search: Arc<dyn WebSearch>,
    max_results: usize,
}

impl ExplorerNode {
    pub fn new(search: Arc<dyn WebSearch>) -> Self {
        Self {
            search,
            max_results: 3,
        }
    }
}

#[async_trait]
impl Node for ExplorerNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let query = snapshot
            .extra_str(research_keys::QUERY)
            .unwrap_or_default()
            .to_string();
        ctx.emit("explorer", format!("searching '{query}'"))?;

        let results: Vec<SearchResult> = match self.search.search(&query, self.max_results).await {
            Ok(results) => results,
            Err(e) => vec![SearchResult {
                title: query.clone(),
                content: format!("Search error: {e}"),
                ..Default::default()
            }],
        };

        let values: Vec<Value> = results
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?;
        Ok(NodePartial::new()
            .with_accum_entries(SEARCH_RESULTS, values)
            .into())
    }
}

/// Merges the accumulated search results into a structured report.
pub struct SynthesizeNode {
    model: Arc<dyn ChatModel>,
}

impl SynthesizeNode {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for SynthesizeNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let topic = snapshot.extra_str(keys::TOPIC).unwrap_or_default();
        let clarified: Vec<String> = snapshot
            .extra
            .get(research_keys::CLARIFIED_TOPICS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let results = snapshot.accum_list(SEARCH_RESULTS);
        ctx.emit(
            "synthesize",
            format!("synthesizing {} search results", results.len()),
        )?;

        let mut results_text = String::new();
        for (i, result) in results.iter().enumerate() {
            let get = |key: &str| {
                result
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("N/A")
                    .to_string()
            };
            results_text.push_str(&format!(
                "\n--- Result {} ---\nTitle: {}\nURL: {}\nContent: {}\n",
                i + 1,
                get("title"),
                get("url"),
                get("content"),
            ));
        }

        let request = ModelRequest::new(vec![Message::user(&format!(
            "Synthesize the following search results into a comprehensive research report.\n\n\
             Original topic: {topic}\n\
             Sub-topics investigated: {}\n\n\
             Search Results:\n{results_text}\n\n\
             Create a well-structured report with:\n\
             - A clear title\n\
             - Executive summary\n\
             - Key findings with evidence and source URLs\n\
             - List of all source URLs\n\
             - Relevant tags\n\
             - Brief methodology description",
            clarified.join(", ")
        ))]);
        let report = self
            .model
            .generate_structured(request, RESEARCH_REPORT_SCHEMA)
            .await?;
        // Validate the shape before committing it to state.
        let _: ResearchReport = serde_json::from_value(report.clone())?;

        Ok(NodePartial::new()
            .with_extra_entry(keys::REPORT, report)
            .with_extra_entry(research_keys::STATUS, json!("synthesized"))
            .into())
    }
}

/// Report review: suspends for approve/edit/redo. Edits are merged
/// shallowly into the report; a redo routes back to orchestration.
pub struct ReviewNode;

#[async_trait]
impl Node for ReviewNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        if let Some(value) = ctx.resume_value() {
            let action = match value {
                Value::String(s) => s.as_str(),
                Value::Object(map) => map
                    .get("action")
                    .and_then(Value::as_str)
                    .unwrap_or("approve"),
                _ => "approve",
            };

            return match action {
                "redo" => Ok(NodePartial::new()
                    .with_extra_entry(research_keys::STATUS, json!("redo"))
                    .into()),
                "edit" => {
                    let mut report = snapshot.extra.get(keys::REPORT).cloned().unwrap_or(Value::Null);
                    if let (Value::Object(report_map), Some(Value::Object(edits))) =
                        (&mut report, value.get("edits"))
                    {
                        for (k, v) in edits {
                            report_map.insert(k.clone(), v.clone());
                        }
                    }
                    Ok(NodePartial::new()
                        .with_extra_entry(keys::REPORT, report)
                        .with_extra_entry(research_keys::STATUS, json!("approved"))
                        .into())
                }
                _ => Ok(NodePartial::new()
                    .with_extra_entry(research_keys::STATUS, json!("approved"))
                    .into()),
            };
        }

        let report: Option<ResearchReport> = snapshot
            .extra
            .get(keys::REPORT)
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        ctx.emit("review", "awaiting report review")?;

        let payload = HitlPayload {
            hitl_type: "review".into(),
            title: "Review Research Report".into(),
            message: "Please review the research report below. You can approve it, \
                      edit it, or request a redo."
                .into(),
            options: vec![
                HitlOption::new("approve", "Approve").with_description("Accept this report"),
                HitlOption::new("edit", "Edit").with_description("Modify the report"),
                HitlOption::new("redo", "Redo").with_description("Re-run the research"),
            ],
            report,
        };
        Ok(NodeOutput::Interrupt(InterruptRequest::new(
            InterruptKind::Review,
            serde_json::to_value(payload)?,
        )))
    }
}

/// Router after review: `End` when approved, back to orchestration on
/// redo.
pub fn review_route(snapshot: StateSnapshot) -> Vec<RouteTarget> {
    if snapshot.extra_str(research_keys::STATUS) == Some("redo") {
        vec![RouteTarget::to("orchestrate")]
    } else {
        vec![RouteTarget::end()]
    }
}

/// Build the research sub-workflow with its narrow embedding contract:
/// `{topic, depth}` in, `{report}` out.
pub fn build_research_workflow(
    model: Arc<dyn ChatModel>,
    search: Arc<dyn WebSearch>,
) -> Result<App, GraphCompileError> {
    GraphBuilder::new()
        .add_node(NodeKind::Custom("clarify".into()), ClarifyNode::new(model.clone()))
        .add_node(
            NodeKind::Custom("orchestrate".into()),
            OrchestrateNode::new(model.clone()),
        )
        .add_node(NodeKind::Custom("explorer".into()), ExplorerNode::new(search))
        .add_node(
            NodeKind::Custom("synthesize".into()),
            SynthesizeNode::new(model),
        )
        .add_node(NodeKind::Custom("review".into()), ReviewNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("clarify".into()))
        .add_edge(
            NodeKind::Custom("clarify".into()),
            NodeKind::Custom("orchestrate".into()),
        )
        .add_conditional_edge(
            NodeKind::Custom("orchestrate".into()),
            Arc::new(route_to_explorers),
        )
        .add_edge(
            NodeKind::Custom("explorer".into()),
            NodeKind::Custom("synthesize".into()),
        )
        .add_edge(
            NodeKind::Custom("synthesize".into()),
            NodeKind::Custom("review".into()),
        )
        .add_conditional_edge(NodeKind::Custom("review".into()), Arc::new(review_route))
        .add_accumulator(SEARCH_RESULTS)
        .with_input_projection(Projection::extra_keys(&[keys::TOPIC, keys::DEPTH]))
        .with_output_projection(Projection::extra_keys(&[keys::REPORT]))
        .compile()
}
