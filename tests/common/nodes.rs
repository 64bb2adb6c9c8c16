use async_trait::async_trait;
use serde_json::{Value, json};

use dialogweave::interrupts::{InterruptKind, InterruptRequest};
use dialogweave::message::Message;
use dialogweave::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use dialogweave::state::StateSnapshot;
use dialogweave::utils::id_generator::IdGenerator;

/// Replies with a fixed assistant message and emits its complete-output
/// event.
#[derive(Debug, Clone)]
pub struct SimpleMessageNode {
    pub msg: &'static str,
}

impl SimpleMessageNode {
    pub fn new(msg: &'static str) -> Self {
        Self { msg }
    }
}

#[async_trait]
impl Node for SimpleMessageNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let message_id = IdGenerator::new().generate_message_id();
        ctx.emit_message_complete(&message_id, self.msg, Vec::new())?;
        Ok(NodePartial::new()
            .with_messages(vec![Message::assistant(self.msg).with_id(&message_id)])
            .into())
    }
}

#[derive(Debug, Clone)]
pub struct NoopNode;

#[async_trait]
impl Node for NoopNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        Ok(NodePartial::default().into())
    }
}

/// Fails every invocation.
#[derive(Debug, Clone, Default)]
pub struct FailingNode;

#[async_trait]
impl Node for FailingNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        Err(NodeError::MissingInput { what: "test_key" })
    }
}

/// Raises a checkbox interrupt on first entry; on resume, records the
/// selection under `extra["selection"]`.
#[derive(Debug, Clone)]
pub struct CheckboxNode {
    pub options: Vec<&'static str>,
}

#[async_trait]
impl Node for CheckboxNode {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        if let Some(value) = ctx.resume_value() {
            return Ok(NodePartial::new()
                .with_extra_entry("selection", value.clone())
                .into());
        }
        Ok(NodeOutput::Interrupt(InterruptRequest::new(
            InterruptKind::Checkbox,
            json!({
                "type": "checkbox",
                "options": self.options,
            }),
        )))
    }
}

/// Appends its overlay `item` to the `items` accumulate list after an
/// overlay-controlled delay, to randomize completion order in fan-out
/// tests.
#[derive(Debug, Clone)]
pub struct AccumSleepNode;

#[async_trait]
impl Node for AccumSleepNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let delay = snapshot
            .extra
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        let item = snapshot.extra.get("item").cloned().unwrap_or(Value::Null);
        Ok(NodePartial::new()
            .with_accum_entries("items", vec![item])
            .into())
    }
}

/// Appends one message and one accumulate entry per pass, for replay and
/// loop tests.
#[derive(Debug, Clone)]
pub struct StepCounterNode;

#[async_trait]
impl Node for StepCounterNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let pass = snapshot.accum_list("passes").len() as u64 + 1;
        ctx.emit("counter", format!("pass {pass}"))?;
        Ok(NodePartial::new()
            .with_messages(vec![Message::assistant(&format!("pass {pass}"))])
            .with_accum_entries("passes", vec![json!(pass)])
            .into())
    }
}
