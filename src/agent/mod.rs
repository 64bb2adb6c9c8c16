//! The conversational research agent built on the engine.
//!
//! Main graph:
//!
//! ```text
//! Start -> retrieve -> agent -> { tools | prepare_research | save_confirm | End }
//!          tools -> agent
//!          prepare_research -> { deep_research | agent }   (recovery hop)
//!          deep_research -> process_research_result -> agent
//!          save_confirm -> { save_to_db | agent }
//!          save_to_db -> agent
//! ```
//!
//! `deep_research` is the compiled research sub-workflow embedded as a
//! single node (see [`research`]); `deep_research` and `save_report` are
//! sentinel tool names the router recognizes without executing.

pub mod nodes;
pub mod research;
pub mod schemas;

use std::sync::Arc;

use serde_json::json;

use crate::app::App;
use crate::collaborators::{ChatModel, Retriever, ToolSchema, WebSearch};
use crate::graphs::{GraphBuilder, GraphCompileError};
use crate::subgraph::SubWorkflowNode;
use crate::tools::builtin::{CalculatorTool, CreatePlanTool, CurrentTimeTool, WebSearchTool};
use crate::tools::{DEEP_RESEARCH_TOOL, SAVE_REPORT_TOOL, ToolRegistry};
use crate::types::NodeKind;

use self::nodes::{
    AgentNode, PrepareResearchNode, ProcessResearchResultNode, RESEARCH_REPORTS, RetrieveNode,
    SaveConfirmNode, SaveToDbNode, ToolsNode, agent_route, keys, research_entry_route,
    save_confirm_route,
};

/// The standard tool surface: executable tools plus the two routing
/// sentinels described to the model.
pub fn standard_tools(model: Arc<dyn ChatModel>, search: Arc<dyn WebSearch>) -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(CurrentTimeTool))
        .with_tool(Arc::new(CalculatorTool))
        .with_tool(Arc::new(WebSearchTool::new(search)))
        .with_tool(Arc::new(CreatePlanTool::new(model)))
        .with_sentinel(ToolSchema::new(
            DEEP_RESEARCH_TOOL,
            "Launch a deep research investigation on a topic. This spawns parallel web \
             searches, synthesizes findings into a structured report, and allows you to \
             review the results.",
            json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "The research topic or question to investigate."
                    },
                    "depth": {
                        "type": "string",
                        "enum": ["quick", "standard", "deep"],
                        "description": "Research depth - 'quick' (3 searches), 'standard' (5), or 'deep' (8)."
                    }
                },
                "required": ["topic"]
            }),
        ))
        .with_sentinel(ToolSchema::new(
            SAVE_REPORT_TOOL,
            "Save a research report from the current conversation to the database.",
            json!({
                "type": "object",
                "properties": {
                    "report_index": {
                        "type": "integer",
                        "description": "Index of the report to save (0 = most recent)."
                    }
                }
            }),
        ))
}

/// Build the full agent workflow with the research sub-workflow embedded
/// as a native node.
pub fn build_agent_workflow(
    model: Arc<dyn ChatModel>,
    search: Arc<dyn WebSearch>,
    retriever: Option<Arc<dyn Retriever>>,
) -> Result<App, GraphCompileError> {
    let tools = Arc::new(standard_tools(model.clone(), search.clone()));
    let research_app = Arc::new(research::build_research_workflow(
        model.clone(),
        search,
    )?);

    GraphBuilder::new()
        .add_node(
            NodeKind::Custom("retrieve".into()),
            RetrieveNode::new(retriever),
        )
        .add_node(
            NodeKind::Custom("agent".into()),
            AgentNode::new(model, tools.clone()),
        )
        .add_node(NodeKind::Custom("tools".into()), ToolsNode::new(tools))
        .add_node(
            NodeKind::Custom("prepare_research".into()),
            PrepareResearchNode,
        )
        .add_shared_node(
            NodeKind::Custom("deep_research".into()),
            Arc::new(
                SubWorkflowNode::new("deep_research", research_app)
                    .with_namespace_key(keys::RESEARCH_RUN_ID),
            ),
        )
        .add_node(
            NodeKind::Custom("process_research_result".into()),
            ProcessResearchResultNode,
        )
        .add_node(NodeKind::Custom("save_confirm".into()), SaveConfirmNode)
        .add_node(NodeKind::Custom("save_to_db".into()), SaveToDbNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("retrieve".into()))
        .add_edge(
            NodeKind::Custom("retrieve".into()),
            NodeKind::Custom("agent".into()),
        )
        .add_conditional_edge(NodeKind::Custom("agent".into()), Arc::new(agent_route))
        .add_edge(
            NodeKind::Custom("tools".into()),
            NodeKind::Custom("agent".into()),
        )
        .add_conditional_edge(
            NodeKind::Custom("prepare_research".into()),
            Arc::new(research_entry_route),
        )
        .add_edge(
            NodeKind::Custom("deep_research".into()),
            NodeKind::Custom("process_research_result".into()),
        )
        .add_edge(
            NodeKind::Custom("process_research_result".into()),
            NodeKind::Custom("agent".into()),
        )
        .add_conditional_edge(
            NodeKind::Custom("save_confirm".into()),
            Arc::new(save_confirm_route),
        )
        .add_edge(
            NodeKind::Custom("save_to_db".into()),
            NodeKind::Custom("agent".into()),
        )
        .add_accumulator(RESEARCH_REPORTS)
        .compile()
}
