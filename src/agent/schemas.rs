//! Structured-output schemas and human-input payloads for the agent.
//!
//! These are the typed shapes the model is asked to produce
//! ([`SubTopicList`], [`InstructionList`], [`ResearchReport`],
//! [`TaskPlan`]) and the payloads shown to a human at interrupt points
//! ([`HitlPayload`]).

use serde::{Deserialize, Serialize};

use crate::collaborators::{SearchResult, StructuredSchema};

pub const SUB_TOPIC_LIST_SCHEMA: StructuredSchema = StructuredSchema {
    name: "SubTopicList",
    description: "Sub-topics or angles to investigate for a research topic",
};

pub const INSTRUCTION_LIST_SCHEMA: StructuredSchema = StructuredSchema {
    name: "InstructionList",
    description: "Search instructions for parallel web researchers",
};

pub const RESEARCH_REPORT_SCHEMA: StructuredSchema = StructuredSchema {
    name: "ResearchReport",
    description: "A structured research report synthesized from search results",
};

/// Sub-topics suggested by the model before clarification.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SubTopicList {
    pub topics: Vec<String>,
}

/// One explorer's search assignment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExplorerInstruction {
    /// A specific, well-crafted web search query.
    pub query: String,
    /// What the researcher should look for.
    pub search_focus: String,
    #[serde(default)]
    pub context: String,
}

/// The orchestrator's full set of explorer instructions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct InstructionList {
    pub instructions: Vec<ExplorerInstruction>,
}

/// One insight backed by evidence and sources.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResearchFinding {
    pub insight: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// The synthesized research report.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResearchReport {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<ResearchFinding>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub methodology: String,
}

/// One step of a task plan.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskItem {
    pub title: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_priority() -> String {
    "medium".to_string()
}

/// A goal broken into prioritized tasks.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPlan {
    pub goal: String,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
    #[serde(default)]
    pub summary: String,
}

/// One selectable option in a human-input payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HitlOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selected: bool,
}

impl HitlOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: String::new(),
            selected: false,
        }
    }

    #[must_use]
    pub fn preselected(mut self) -> Self {
        self.selected = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The payload shown to a human at an interrupt point.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HitlPayload {
    /// Widget hint: `checkbox`, `review`, or `confirm`.
    pub hitl_type: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub options: Vec<HitlOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ResearchReport>,
}

/// Re-exported so report construction sites can name both shapes from one
/// module.
pub type WebSearchResult = SearchResult;
