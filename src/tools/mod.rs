//! Tool trait, registry, and sentinel declarations.
//!
//! Two kinds of tool names reach the model: executable tools, run by the
//! tools node through the [`ToolRegistry`], and **sentinel** tools —
//! recognized by the agent's router purely by name to trigger a
//! control-flow branch (into the research sub-workflow or the save flow).
//! A sentinel's body never executes.

pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::collaborators::{ToolError, ToolSchema};

/// Sentinel tool: routes the agent into the deep-research sub-workflow.
pub const DEEP_RESEARCH_TOOL: &str = "deep_research";
/// Sentinel tool: routes the agent into the save-confirmation flow.
pub const SAVE_REPORT_TOOL: &str = "save_report";

/// The closed set of sentinel names for the agent workflow.
pub const SENTINEL_TOOLS: &[&str] = &[DEEP_RESEARCH_TOOL, SAVE_REPORT_TOOL];

/// An executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Execute with JSON arguments, returning the textual result shown to
    /// the model.
    async fn invoke(&self, args: Value) -> Result<String, ToolError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description(), self.parameters())
    }
}

/// Registry of executable tools plus declared sentinel schemas.
#[derive(Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
    sentinel_schemas: Vec<ToolSchema>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Declare a sentinel schema: described to the model, never executed.
    #[must_use]
    pub fn with_sentinel(mut self, schema: ToolSchema) -> Self {
        self.sentinel_schemas.push(schema);
        self
    }

    /// Whether a tool name is a routing sentinel.
    #[must_use]
    pub fn is_sentinel(&self, name: &str) -> bool {
        self.sentinel_schemas.iter().any(|s| s.name == name)
    }

    /// All schemas bound to the model: executable tools plus sentinels.
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas.extend(self.sentinel_schemas.iter().cloned());
        schemas
    }

    /// Execute a tool by name. Sentinels are rejected here — the router
    /// should have intercepted them.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, ToolError> {
        if self.is_sentinel(name) {
            return Err(ToolError::Execution {
                message: format!("{name} is a routing sentinel and cannot be executed"),
            });
        }
        let tool = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        tool.invoke(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back."
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn invoke(&self, args: Value) -> Result<String, ToolError> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    #[tokio::test]
    async fn registry_executes_tools_and_rejects_sentinels() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(EchoTool))
            .with_sentinel(ToolSchema::new(
                DEEP_RESEARCH_TOOL,
                "Launch a deep research investigation.",
                json!({"type": "object"}),
            ));

        assert!(registry.is_sentinel(DEEP_RESEARCH_TOOL));
        assert!(!registry.is_sentinel("echo"));

        let out = registry.invoke("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, "hi");

        assert!(registry.invoke(DEEP_RESEARCH_TOOL, json!({})).await.is_err());
        assert!(matches!(
            registry.invoke("missing", json!({})).await,
            Err(ToolError::UnknownTool { .. })
        ));
    }

    #[test]
    fn schemas_include_sentinels_last() {
        let registry = ToolRegistry::new()
            .with_tool(Arc::new(EchoTool))
            .with_sentinel(ToolSchema::new(SAVE_REPORT_TOOL, "Save a report.", json!({})));
        let schemas = registry.schemas();
        assert_eq!(schemas.last().unwrap().name, SAVE_REPORT_TOOL);
    }
}
