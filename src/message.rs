use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool invocation requested by the model.
///
/// Tool calls are attached to assistant messages; the matching result comes
/// back as a message with role [`Message::TOOL`] carrying the same
/// `tool_call_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id correlating the call with its result message.
    pub id: String,
    /// Tool name; sentinel names are routed, not executed.
    pub name: String,
    /// JSON arguments as produced by the model.
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// A message in a conversation: a role, text content, and (for assistant
/// turns) any tool calls the model requested.
///
/// # Examples
///
/// ```
/// use dialogweave::message::Message;
///
/// let user = Message::user("What's the weather?");
/// let reply = Message::assistant("Let me check.");
/// assert!(user.has_role(Message::USER));
/// assert!(reply.tool_calls.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the sender; use the constants on [`Message`].
    pub role: String,
    /// The text content of the message.
    pub content: String,
    /// Tool invocations requested by an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-result messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-result messages: the tool's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stable id used to key streaming partial/complete events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// Assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";
    /// Tool result message role.
    pub const TOOL: &'static str = "tool";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates an assistant message that carries tool calls.
    #[must_use]
    pub fn assistant_with_tool_calls(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Self::ASSISTANT, content)
        }
    }

    /// Creates a tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(content: &str, tool_call_id: &str, name: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            name: Some(name.to_string()),
            ..Self::new(Self::TOOL, content)
        }
    }

    /// Attach a stable message id (used to key streaming events).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Returns the first tool call with the given name, if any.
    #[must_use]
    pub fn tool_call_named(&self, name: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|tc| tc.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn convenience_constructors() {
        let user = Message::user("Hello");
        assert_eq!(user.role, Message::USER);
        assert_eq!(user.content, "Hello");

        let tool = Message::tool("42", "call-1", "calculator");
        assert_eq!(tool.role, Message::TOOL);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(tool.name.as_deref(), Some("calculator"));
    }

    #[test]
    fn tool_call_lookup() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCall::new("a", "calculator", json!({"expression": "2+2"})),
                ToolCall::new("b", "deep_research", json!({"topic": "rust"})),
            ],
        );
        assert!(msg.tool_call_named("deep_research").is_some());
        assert!(msg.tool_call_named("save_report").is_none());
    }

    #[test]
    fn serialization_skips_empty_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());

        let parsed: Message = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, Message::user("hi"));
    }

    #[test]
    fn roundtrip_with_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "calling",
            vec![ToolCall::new("id1", "get_current_time", json!({}))],
        )
        .with_id("msg-1234");
        let text = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(msg, parsed);
    }
}
