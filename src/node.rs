//! Node execution primitives.
//!
//! A [`Node`] is one unit of computation in a workflow: it receives an
//! immutable state snapshot plus its execution context and returns either a
//! partial state update or an interrupt request. Nodes are stateless
//! between invocations; anything that must survive lives in the state
//! channels or the checkpointer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::channels::errors::ErrorEvent;
use crate::collaborators::CollaboratorError;
use crate::event_bus::{Event, MessageStreamEvent};
use crate::interrupts::{InterruptRequest, ResumeEnvelope};
use crate::message::{Message, ToolCall};
use crate::runtimes::Checkpointer;
use crate::state::StateSnapshot;

/// Core trait for executable workflow nodes.
///
/// # Design
///
/// - **Stateless**: all inputs arrive through the snapshot and context.
/// - **Suspendable**: returning [`NodeOutput::Interrupt`] parks the run
///   durably until a human answers; the node is re-entered with the answer
///   in [`NodeContext::resume`] and must not repeat work it committed
///   before suspending.
/// - **Observable**: the context emits node-scoped events and streaming
///   message deltas to the run's event bus.
///
/// # Errors
///
/// Return `Err(NodeError)` for failures that should fail the step (the
/// last good checkpoint stays intact). Recoverable problems go into
/// `NodePartial::errors` instead.
///
/// # Examples
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use dialogweave::message::Message;
/// use dialogweave::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
/// use dialogweave::state::StateSnapshot;
///
/// struct GreetingNode;
///
/// #[async_trait]
/// impl Node for GreetingNode {
///     async fn run(
///         &self,
///         _snapshot: StateSnapshot,
///         ctx: NodeContext,
///     ) -> Result<NodeOutput, NodeError> {
///         ctx.emit("greeting", "composing reply")?;
///         Ok(NodePartial::new()
///             .with_messages(vec![Message::assistant("Hello!")])
///             .into())
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node against the given snapshot.
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext)
    -> Result<NodeOutput, NodeError>;
}

/// What a node produced: a state update or a suspension request.
#[derive(Clone, Debug)]
pub enum NodeOutput {
    /// Merge this partial update into run state at the barrier.
    Update(NodePartial),
    /// Suspend the run and wait for human input.
    Interrupt(InterruptRequest),
}

impl From<NodePartial> for NodeOutput {
    fn from(partial: NodePartial) -> Self {
        NodeOutput::Update(partial)
    }
}

impl From<InterruptRequest> for NodeOutput {
    fn from(request: InterruptRequest) -> Self {
        NodeOutput::Interrupt(request)
    }
}

/// Execution context handed to a node for one invocation.
#[derive(Clone)]
pub struct NodeContext {
    /// Identifier of this node in the graph.
    pub node_id: String,
    /// Current superstep number.
    pub step: u64,
    /// Session this invocation belongs to.
    pub session_id: String,
    /// Node path of the owning runner; non-empty inside sub-workflows.
    pub path: Vec<String>,
    /// Channel for emitting events to the run's event bus.
    pub event_bus_sender: flume::Sender<Event>,
    /// Shared checkpointer, present when the runner persists state. Needed
    /// by sub-workflow nodes so parent and child share one history.
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    /// Concurrency limit inherited by sub-workflow runners.
    pub concurrency_limit: usize,
    /// Present only when this node is the target of a resume: the pending
    /// token's payload plus the human's validated answer.
    pub resume: Option<Arc<ResumeEnvelope>>,
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node_id)
            .field("step", &self.step)
            .field("session_id", &self.session_id)
            .field("path", &self.path)
            .field("resuming", &self.resume.is_some())
            .finish()
    }
}

impl NodeContext {
    /// Emit a node-scoped diagnostic message enriched with this context's
    /// metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.send(Event::node_message(
            self.node_id.clone(),
            self.step,
            self.path.clone(),
            scope,
            message,
        ))
    }

    /// Emit a cumulative partial-content event for a streaming message.
    pub fn emit_message_partial(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<(), NodeContextError> {
        self.send(Event::Message(MessageStreamEvent::partial(
            self.session_id.clone(),
            self.node_id.clone(),
            message_id,
            content,
        )))
    }

    /// Emit the final content (and tool calls) for a streaming message.
    pub fn emit_message_complete(
        &self,
        message_id: &str,
        content: &str,
        tool_calls: Vec<ToolCall>,
    ) -> Result<(), NodeContextError> {
        self.send(Event::Message(MessageStreamEvent::complete(
            self.session_id.clone(),
            self.node_id.clone(),
            message_id,
            content,
            tool_calls,
        )))
    }

    /// Emit a raw event.
    pub fn send(&self, event: Event) -> Result<(), NodeContextError> {
        self.event_bus_sender
            .send(event)
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }

    /// The human's answer when this invocation is resuming an interrupt.
    #[must_use]
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume.as_ref().map(|env| &env.value)
    }

    /// The payload of the interrupt being resumed, as originally raised.
    #[must_use]
    pub fn resume_payload(&self) -> Option<&Value> {
        self.resume.as_ref().map(|env| &env.token.payload)
    }
}

/// Partial state update returned by a node.
///
/// All fields are optional; the barrier merges whatever is present through
/// the channel reducers.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    /// Messages appended to the conversation history.
    pub messages: Option<Vec<Message>>,
    /// Key/value data merged into the extra channel (replace per key).
    pub extra: Option<FxHashMap<String, Value>>,
    /// Entries appended to declared accumulate lists.
    pub accum: Option<FxHashMap<String, Vec<Value>>>,
    /// Recoverable errors appended to the errors channel.
    pub errors: Option<Vec<ErrorEvent>>,
}

impl NodePartial {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: FxHashMap<String, Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Set a single extra key.
    #[must_use]
    pub fn with_extra_entry(mut self, key: &str, value: Value) -> Self {
        self.extra
            .get_or_insert_with(FxHashMap::default)
            .insert(key.to_string(), value);
        self
    }

    /// Append entries to one accumulate list.
    #[must_use]
    pub fn with_accum_entries(mut self, list: &str, values: Vec<Value>) -> Self {
        self.accum
            .get_or_insert_with(FxHashMap::default)
            .entry(list.to_string())
            .or_default()
            .extend(values);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// Errors that can occur when using [`NodeContext`] methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent because the event bus is disconnected.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(dialogweave::node::event_bus_unavailable),
        help("The event bus may be disconnected. Check the runner's lifecycle.")
    )]
    EventBusUnavailable,
}

/// Fatal errors that fail the current step.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot or context.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(dialogweave::node::missing_input),
        help("Check that an upstream node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// An external collaborator (model, search, retriever) failed.
    #[error(transparent)]
    #[diagnostic(code(dialogweave::node::collaborator))]
    Collaborator(#[from] CollaboratorError),

    /// An embedded sub-workflow failed.
    #[error("sub-workflow {name} failed: {message}")]
    #[diagnostic(code(dialogweave::node::subworkflow))]
    Subworkflow { name: String, message: String },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(dialogweave::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(code(dialogweave::node::validation))]
    ValidationFailed(String),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(dialogweave::node::event_bus))]
    EventBus(#[from] NodeContextError),
}
