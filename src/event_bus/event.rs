use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::interrupts::InterruptToken;
use crate::message::ToolCall;

/// Scope label of the diagnostic that terminates a subscriber stream.
pub const STREAM_END_SCOPE: &str = "__dialogweave_stream_end__";

/// A typed event observed on the run's event stream.
///
/// Events are delivered strictly in emission order; the JSON rendering
/// ([`Event::to_json_value`]) tags each with a kebab-case `type` so a
/// remote transport can multiplex them:
/// `run-started`, `run-finished`, `run-failed`, `node-active`,
/// `node-completed`, `node-message`, `message-partial`, `message-complete`,
/// `interrupt`, `diagnostic`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Run(RunEvent),
    Node(NodeEvent),
    Message(MessageStreamEvent),
    Interrupt(InterruptEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn run_started(session_id: impl Into<String>) -> Self {
        Event::Run(RunEvent {
            session_id: session_id.into(),
            status: RunStatusEvent::Started,
            step: None,
            error: None,
        })
    }

    pub fn run_finished(session_id: impl Into<String>, step: u64) -> Self {
        Event::Run(RunEvent {
            session_id: session_id.into(),
            status: RunStatusEvent::Finished,
            step: Some(step),
            error: None,
        })
    }

    pub fn run_failed(session_id: impl Into<String>, step: Option<u64>, error: String) -> Self {
        Event::Run(RunEvent {
            session_id: session_id.into(),
            status: RunStatusEvent::Failed,
            step,
            error: Some(error),
        })
    }

    pub fn node_active(node_id: impl Into<String>, step: u64, path: Vec<String>) -> Self {
        Event::Node(NodeEvent {
            node_id: node_id.into(),
            step,
            path,
            kind: NodeEventKind::Active,
        })
    }

    pub fn node_completed(node_id: impl Into<String>, step: u64, path: Vec<String>) -> Self {
        Event::Node(NodeEvent {
            node_id: node_id.into(),
            step,
            path,
            kind: NodeEventKind::Completed,
        })
    }

    pub fn node_message(
        node_id: impl Into<String>,
        step: u64,
        path: Vec<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Node(NodeEvent {
            node_id: node_id.into(),
            step,
            path,
            kind: NodeEventKind::Message {
                scope: scope.into(),
                message: message.into(),
            },
        })
    }

    pub fn interrupt(session_id: impl Into<String>, token: &InterruptToken) -> Self {
        Event::Interrupt(InterruptEvent {
            session_id: session_id.into(),
            token_id: token.id.clone(),
            node_id: token.node.name().to_string(),
            path: token.path.clone(),
            kind: token.kind.as_str().to_string(),
            payload: token.payload.clone(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// The event's scope label, when it has one.
    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Event::Diagnostic(diag) => Some(diag.scope.as_str()),
            Event::Node(node) => match &node.kind {
                NodeEventKind::Message { scope, .. } => Some(scope.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Kebab-case type tag used on the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Event::Run(run) => match run.status {
                RunStatusEvent::Started => "run-started",
                RunStatusEvent::Finished => "run-finished",
                RunStatusEvent::Failed => "run-failed",
            },
            Event::Node(node) => match node.kind {
                NodeEventKind::Active => "node-active",
                NodeEventKind::Completed => "node-completed",
                NodeEventKind::Message { .. } => "node-message",
            },
            Event::Message(msg) => {
                if msg.is_final {
                    "message-complete"
                } else {
                    "message-partial"
                }
            }
            Event::Interrupt(_) => "interrupt",
            Event::Diagnostic(_) => "diagnostic",
        }
    }

    /// Render the event as a self-describing JSON object.
    pub fn to_json_value(&self) -> Value {
        let payload = match self {
            Event::Run(run) => json!({
                "session_id": run.session_id,
                "step": run.step,
                "error": run.error,
            }),
            Event::Node(node) => {
                let mut value = json!({
                    "node": node.node_id,
                    "step": node.step,
                    "subgraph": node.is_subgraph(),
                    "path": node.path,
                });
                if let NodeEventKind::Message { scope, message } = &node.kind {
                    value["scope"] = json!(scope);
                    value["message"] = json!(message);
                }
                value
            }
            Event::Message(msg) => json!({
                "session_id": msg.session_id,
                "node": msg.node_id,
                "id": msg.message_id,
                "content": msg.content,
                "tool_calls": msg.tool_calls,
            }),
            Event::Interrupt(intr) => json!({
                "session_id": intr.session_id,
                "token_id": intr.token_id,
                "node": intr.node_id,
                "path": intr.path,
                "kind": intr.kind,
                "payload": intr.payload,
            }),
            Event::Diagnostic(diag) => json!({
                "scope": diag.scope,
                "message": diag.message,
            }),
        };
        json!({
            "type": self.type_tag(),
            "timestamp": Utc::now().to_rfc3339(),
            "data": payload,
        })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Run(run) => write!(
                f,
                "[run {}] {}{}",
                run.session_id,
                self.type_tag(),
                run.error
                    .as_deref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            ),
            Event::Node(node) => match &node.kind {
                NodeEventKind::Message { scope, message } => {
                    write!(f, "[{}@{}] {scope}: {message}", node.node_id, node.step)
                }
                _ => write!(f, "[{}@{}] {}", node.node_id, node.step, self.type_tag()),
            },
            Event::Message(msg) => write!(f, "[{}] {}", msg.message_id, msg.content),
            Event::Interrupt(intr) => {
                write!(f, "[interrupt {}] {} at {}", intr.kind, intr.token_id, intr.node_id)
            }
            Event::Diagnostic(diag) => write!(f, "{}", diag.message),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatusEvent {
    Started,
    Finished,
    Failed,
}

/// Run lifecycle transition, emitted only by the root workflow's runner.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub session_id: String,
    pub status: RunStatusEvent,
    pub step: Option<u64>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeEventKind {
    Active,
    Completed,
    Message { scope: String, message: String },
}

/// Node lifecycle or node-scoped diagnostic. `path` is the node path of
/// the owning runner; a non-empty path marks a sub-workflow origin.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeEvent {
    pub node_id: String,
    pub step: u64,
    pub path: Vec<String>,
    pub kind: NodeEventKind,
}

impl NodeEvent {
    pub fn is_subgraph(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Streaming output for one logical message. `content` is cumulative, so a
/// consumer keyed on `message_id` replaces in place instead of appending
/// duplicate text.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageStreamEvent {
    pub session_id: String,
    pub node_id: String,
    pub message_id: String,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl MessageStreamEvent {
    pub fn partial(
        session_id: String,
        node_id: String,
        message_id: &str,
        content: &str,
    ) -> Self {
        Self {
            session_id,
            node_id,
            message_id: message_id.to_string(),
            content: content.to_string(),
            tool_calls: Vec::new(),
            is_final: false,
            timestamp: Utc::now(),
        }
    }

    pub fn complete(
        session_id: String,
        node_id: String,
        message_id: &str,
        content: &str,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            session_id,
            node_id,
            message_id: message_id.to_string(),
            content: content.to_string(),
            tool_calls,
            is_final: true,
            timestamp: Utc::now(),
        }
    }
}

/// A pending interrupt announced to consumers, after it was durably
/// checkpointed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InterruptEvent {
    pub session_id: String,
    pub token_id: String,
    pub node_id: String,
    pub path: Vec<String>,
    pub kind: String,
    pub payload: Value,
}

/// Free-form engine diagnostic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_match_wire_protocol() {
        assert_eq!(Event::run_started("s").type_tag(), "run-started");
        assert_eq!(
            Event::node_active("agent", 1, vec![]).type_tag(),
            "node-active"
        );
        let partial = Event::Message(MessageStreamEvent::partial(
            "s".into(),
            "agent".into(),
            "msg-1",
            "He",
        ));
        assert_eq!(partial.type_tag(), "message-partial");
    }

    #[test]
    fn subgraph_flag_follows_path() {
        let Event::Node(event) = Event::node_active("clarify", 2, vec!["deep_research".into()])
        else {
            panic!("expected node event");
        };
        assert!(event.is_subgraph());
        let json = Event::Node(event).to_json_value();
        assert_eq!(json["data"]["subgraph"], true);
    }
}
