//! Durable human-in-the-loop suspension points.
//!
//! A node asks for human input by returning
//! [`NodeOutput::Interrupt`](crate::node::NodeOutput::Interrupt) instead of
//! a state update. The runner mints an [`InterruptToken`], checkpoints it
//! durably *before* announcing it, and parks the run as `Interrupted`. A
//! later resume revalidates the supplied value against the token's kind and
//! re-enters the issuing node with a [`ResumeEnvelope`] — the node receives
//! both the original payload and the human's answer, so work committed
//! before the suspension is not repeated.
//!
//! Suspension is expressed as state transitions plus durable tokens, never
//! as a blocked task: a run can stay `Interrupted` for days and survive a
//! process restart.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::NodeKind;

/// The closed set of interrupt shapes a workflow can raise.
///
/// Each kind fixes the shape of the resume value it accepts, which lets
/// the engine reject malformed resume attempts without touching state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// Multi-select over offered options; resumes with an array of option
    /// ids (e.g. `["topic_0", "topic_2"]`).
    Checkbox,
    /// Review of a produced artifact; resumes with
    /// `{"action": "approve" | "edit" | "redo", "edits"?: {...}}`.
    Review,
    /// Yes/no confirmation; resumes with
    /// `{"action": "save" | "cancel"}` (a bare action string also works).
    Confirm,
}

impl InterruptKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptKind::Checkbox => "checkbox",
            InterruptKind::Review => "review",
            InterruptKind::Confirm => "confirm",
        }
    }
}

/// A node's request to suspend the run for human input.
///
/// Plain nodes build one with [`InterruptRequest::new`]; a sub-workflow
/// adapter propagates a child token upward with
/// [`InterruptRequest::propagated`], preserving the child's token id and
/// extending the path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterruptRequest {
    pub kind: InterruptKind,
    pub payload: Value,
    /// Node path *below* the raising node; empty for plain nodes.
    pub path: Vec<String>,
    /// Preserved token id when propagating a child interrupt.
    pub token_id: Option<String>,
}

impl InterruptRequest {
    #[must_use]
    pub fn new(kind: InterruptKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            path: Vec::new(),
            token_id: None,
        }
    }

    /// Wrap a child workflow's pending token for the parent run.
    #[must_use]
    pub fn propagated(token: InterruptToken) -> Self {
        Self {
            kind: token.kind,
            payload: token.payload,
            path: token.path,
            token_id: Some(token.id),
        }
    }
}

/// The durable record of a pending interrupt.
///
/// Exactly one token is pending per run at a time. The token is consumed
/// by the first successful resume; a subsequent interrupt mints a fresh
/// token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptToken {
    /// Unique id, stable across checkpoint reload.
    pub id: String,
    /// The node that raised the interrupt (the last path element).
    pub node: NodeKind,
    /// Full node path from the root workflow to the issuing node, e.g.
    /// `["deep_research", "clarify"]` for a sub-workflow interrupt.
    pub path: Vec<String>,
    pub kind: InterruptKind,
    /// Schema-typed payload shown to the human (options, report, ...).
    pub payload: Value,
    pub raised_at: DateTime<Utc>,
}

impl InterruptToken {
    /// Whether the token originated below the root workflow.
    #[must_use]
    pub fn is_subworkflow(&self) -> bool {
        self.path.len() > 1
    }

    /// The root-level node the resume value must be routed into.
    #[must_use]
    pub fn resume_target(&self) -> NodeKind {
        self.path
            .first()
            .map(|name| NodeKind::from(name.as_str()))
            .unwrap_or_else(|| self.node.clone())
    }
}

/// A validated resume value on its way back to the issuing node.
#[derive(Clone, Debug)]
pub struct ResumeEnvelope {
    /// The token being consumed; its payload gives the node back the
    /// context it computed before suspending.
    pub token: InterruptToken,
    /// The human's answer, already shape-checked against the token kind.
    pub value: Value,
}

/// Rejection of a resume value whose shape does not match the pending
/// token. The run stays `Interrupted` and no state is touched.
#[derive(Debug, Error, Diagnostic)]
#[error("resume value does not match pending {kind} interrupt: {reason}")]
#[diagnostic(
    code(dialogweave::interrupts::resume_shape),
    help("Inspect the interrupt payload to see which shape the node expects.")
)]
pub struct ResumeShapeError {
    pub kind: &'static str,
    pub reason: String,
}

fn action_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("action").and_then(Value::as_str),
        _ => None,
    }
}

/// Check a resume value against the shape the interrupt kind accepts.
pub fn validate_resume_value(kind: InterruptKind, value: &Value) -> Result<(), ResumeShapeError> {
    match kind {
        InterruptKind::Checkbox => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => Err(ResumeShapeError {
                kind: kind.as_str(),
                reason: "expected an array of selected option ids".into(),
            }),
        },
        InterruptKind::Review => match action_of(value) {
            Some("approve" | "edit" | "redo") => Ok(()),
            _ => Err(ResumeShapeError {
                kind: kind.as_str(),
                reason: "expected action approve, edit, or redo".into(),
            }),
        },
        InterruptKind::Confirm => match action_of(value) {
            Some("save" | "cancel") => Ok(()),
            _ => Err(ResumeShapeError {
                kind: kind.as_str(),
                reason: "expected action save or cancel".into(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkbox_accepts_string_array() {
        assert!(validate_resume_value(InterruptKind::Checkbox, &json!(["topic_0"])).is_ok());
        assert!(validate_resume_value(InterruptKind::Checkbox, &json!([])).is_ok());
        assert!(validate_resume_value(InterruptKind::Checkbox, &json!("topic_0")).is_err());
        assert!(validate_resume_value(InterruptKind::Checkbox, &json!([1, 2])).is_err());
    }

    #[test]
    fn review_accepts_known_actions() {
        assert!(validate_resume_value(InterruptKind::Review, &json!({"action": "approve"})).is_ok());
        assert!(
            validate_resume_value(
                InterruptKind::Review,
                &json!({"action": "edit", "edits": {"title": "New"}})
            )
            .is_ok()
        );
        assert!(validate_resume_value(InterruptKind::Review, &json!("redo")).is_ok());
        assert!(validate_resume_value(InterruptKind::Review, &json!({"action": "ship"})).is_err());
    }

    #[test]
    fn confirm_accepts_save_or_cancel() {
        assert!(validate_resume_value(InterruptKind::Confirm, &json!({"action": "save"})).is_ok());
        assert!(validate_resume_value(InterruptKind::Confirm, &json!("cancel")).is_ok());
        assert!(validate_resume_value(InterruptKind::Confirm, &json!(true)).is_err());
    }

    #[test]
    fn resume_target_is_first_path_element() {
        let token = InterruptToken {
            id: "t1".into(),
            node: NodeKind::Custom("clarify".into()),
            path: vec!["deep_research".into(), "clarify".into()],
            kind: InterruptKind::Checkbox,
            payload: json!({}),
            raised_at: Utc::now(),
        };
        assert!(token.is_subworkflow());
        assert_eq!(token.resume_target(), NodeKind::Custom("deep_research".into()));
    }
}
