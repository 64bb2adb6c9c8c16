//! External collaborator interfaces.
//!
//! The engine calls language models, web search, and document retrieval
//! through these narrow traits so the workflow layer stays testable and the
//! heavy integrations stay pluggable. Production implementations live
//! outside this crate; tests script them.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::{Message, ToolCall};

/// JSON-schema style description of a tool, handed to the model so it can
/// emit tool calls. Sentinel tools are described here too even though they
/// are never executed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A request to the chat model: the conversation so far plus the tool
/// schemas it may call.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tool_schemas: Vec<ToolSchema>,
}

impl ModelRequest {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tool_schemas: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tool_schemas: Vec<ToolSchema>) -> Self {
        self.tool_schemas = tool_schemas;
        self
    }
}

/// The model's reply: final content plus any tool calls it requested.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }
}

/// Names the structured-output shape a caller expects back from
/// [`ChatModel::generate_structured`]. Callers deserialize the returned
/// value into their own typed schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructuredSchema {
    pub name: &'static str,
    pub description: &'static str,
}

/// One ranked chunk returned by the retriever.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    pub score: f64,
}

/// One web search hit.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

/// Failures reported by external collaborators.
///
/// The engine performs no retries itself; adapters own their retry policy.
#[derive(Debug, Error, Diagnostic)]
pub enum CollaboratorError {
    /// Provider-side failure (network, quota, model error).
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(dialogweave::collaborators::provider))]
    Provider { provider: String, message: String },

    /// The model's structured output did not validate against the declared
    /// shape.
    #[error("structured output for {schema} failed validation: {message}")]
    #[diagnostic(
        code(dialogweave::collaborators::structured_output),
        help("The model returned a value that does not match the requested schema.")
    )]
    StructuredOutput { schema: String, message: String },
}

impl CollaboratorError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn structured_output(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StructuredOutput {
            schema: schema.into(),
            message: message.into(),
        }
    }
}

/// Failures reported by executable tools. Tool failures are surfaced as
/// tool-message content rather than aborting the run.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    #[diagnostic(code(dialogweave::tools::unknown))]
    UnknownTool { name: String },

    #[error("invalid arguments: {message}")]
    #[diagnostic(code(dialogweave::tools::invalid_args))]
    InvalidArgs { message: String },

    #[error("tool execution failed: {message}")]
    #[diagnostic(code(dialogweave::tools::execution))]
    Execution { message: String },
}

/// The language-model collaborator.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a reply. When `deltas` is supplied the implementation
    /// streams incremental content chunks through it while producing the
    /// final response; the sender is dropped when generation finishes.
    async fn generate(
        &self,
        request: ModelRequest,
        deltas: Option<flume::Sender<String>>,
    ) -> Result<ModelResponse, CollaboratorError>;

    /// Generate schema-constrained structured output. The returned value is
    /// already validated against the named shape by the implementation;
    /// callers deserialize it into their typed schema and treat mismatches
    /// as [`CollaboratorError::StructuredOutput`].
    async fn generate_structured(
        &self,
        request: ModelRequest,
        schema: StructuredSchema,
    ) -> Result<Value, CollaboratorError>;
}

/// The document-retrieval collaborator consumed by the context-injection
/// node.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, CollaboratorError>;
}

/// The web-search collaborator used by quick lookups and research
/// explorers.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError>;
}
