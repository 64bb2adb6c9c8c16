//! Versioned run state and snapshots.
//!
//! State is organized into four channels, each with its own version counter
//! and merge policy:
//!
//! - **messages** — conversation history (append)
//! - **extra** — JSON key/value scratch space (replace per key)
//! - **accum** — named append-accumulate lists that never shrink within a
//!   run (e.g. the running list of research reports)
//! - **errors** — non-fatal error events (append)
//!
//! Nodes only ever see an immutable [`StateSnapshot`]; the engine applies
//! their partial updates through the reducer registry at the barrier.
//!
//! # Examples
//!
//! ```rust
//! use dialogweave::state::VersionedState;
//! use dialogweave::channels::Channel;
//! use serde_json::json;
//!
//! let mut state = VersionedState::new_with_user_message("Hello!");
//! state.add_extra("model", json!("mini"));
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.messages.len(), 1);
//! assert_eq!(snapshot.extra.get("model"), Some(&json!("mini")));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    channels::{AccumChannel, Channel, ErrorsChannel, ExtrasChannel, MessagesChannel},
    message::Message,
    node::NodePartial,
};

/// The main state container for a run.
///
/// Channel versions are bumped by the barrier only when content changed,
/// so `snapshot().messages_version` is a cheap change detector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedState {
    /// Conversation history.
    pub messages: MessagesChannel,
    /// Custom metadata and intermediate results.
    pub extra: ExtrasChannel,
    /// Append-accumulate lists declared by the workflow's channel schema.
    pub accum: AccumChannel,
    /// Non-fatal error events.
    pub errors: ErrorsChannel,
}

/// Immutable snapshot of run state at a point in time.
///
/// Snapshots are handed to nodes during execution; mutating the original
/// state afterwards does not affect them.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub messages: Vec<Message>,
    pub messages_version: u32,
    pub extra: FxHashMap<String, Value>,
    pub extra_version: u32,
    pub accum: FxHashMap<String, Vec<Value>>,
    pub accum_version: u32,
    pub errors: Vec<crate::channels::errors::ErrorEvent>,
    pub errors_version: u32,
}

impl StateSnapshot {
    /// The most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Fetch an extra value as a string slice.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Fetch an accumulate list, empty slice when absent.
    #[must_use]
    pub fn accum_list(&self, key: &str) -> &[Value] {
        self.accum.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl VersionedState {
    /// Create a state seeded with a single user message — the usual entry
    /// point for a fresh conversation turn.
    pub fn new_with_user_message(user_text: &str) -> Self {
        Self::new_with_messages(vec![Message::user(user_text)])
    }

    /// Create a state seeded with an existing chat history.
    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: MessagesChannel::new(messages, 1),
            extra: ExtrasChannel::default(),
            accum: AccumChannel::default(),
            errors: ErrorsChannel::default(),
        }
    }

    /// Builder for states with custom messages, extras, and accumulators.
    pub fn builder() -> VersionedStateBuilder {
        VersionedStateBuilder::default()
    }

    /// Append a message. Versions are not bumped here; the barrier owns
    /// version accounting.
    pub fn add_message(&mut self, role: &str, content: &str) -> &mut Self {
        self.messages.get_mut().push(Message::new(role, content));
        self
    }

    /// Insert an extra value.
    pub fn add_extra(&mut self, key: &str, value: Value) -> &mut Self {
        self.extra.get_mut().insert(key.to_string(), value);
        self
    }

    /// Take an immutable snapshot of all channels.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            messages: self.messages.snapshot(),
            messages_version: self.messages.version(),
            extra: self.extra.snapshot(),
            extra_version: self.extra.version(),
            accum: self.accum.snapshot(),
            accum_version: self.accum.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }
}

/// Fluent builder for [`VersionedState`].
#[derive(Debug, Default)]
pub struct VersionedStateBuilder {
    messages: Vec<Message>,
    extra: FxHashMap<String, Value>,
    accum: FxHashMap<String, Vec<Value>>,
}

impl VersionedStateBuilder {
    pub fn with_user_message(mut self, content: &str) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_assistant_message(mut self, content: &str) -> Self {
        self.messages.push(Message::assistant(content));
        self
    }

    pub fn with_system_message(mut self, content: &str) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn with_accum_entry(mut self, list: &str, value: Value) -> Self {
        self.accum.entry(list.to_string()).or_default().push(value);
        self
    }

    pub fn build(self) -> VersionedState {
        VersionedState {
            messages: MessagesChannel::new(self.messages, 1),
            extra: ExtrasChannel::new(self.extra, 1),
            accum: AccumChannel::new(self.accum, 1),
            errors: ErrorsChannel::default(),
        }
    }
}

/// Narrowed view of a workflow's state used to embed it as a sub-workflow.
///
/// The parent projects its snapshot *down* through the child's input
/// projection and reads the child's final state back *up* through the
/// output projection, so neither graph needs to know the other's internal
/// channel layout.
#[derive(Clone, Debug, Default)]
pub struct Projection {
    /// Whether the conversation history crosses the boundary.
    pub messages: bool,
    /// Extra keys that cross the boundary.
    pub extra: Vec<String>,
    /// Accumulate lists that cross the boundary.
    pub accum: Vec<String>,
}

impl Projection {
    /// A projection carrying only the named extra keys.
    #[must_use]
    pub fn extra_keys(keys: &[&str]) -> Self {
        Self {
            messages: false,
            extra: keys.iter().map(|k| (*k).to_string()).collect(),
            accum: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_messages(mut self) -> Self {
        self.messages = true;
        self
    }

    #[must_use]
    pub fn with_accum(mut self, list: &str) -> Self {
        self.accum.push(list.to_string());
        self
    }

    /// Project a parent snapshot into a fresh child state.
    #[must_use]
    pub fn project_state(&self, snapshot: &StateSnapshot) -> VersionedState {
        let mut builder = VersionedState::builder();
        if self.messages {
            for message in &snapshot.messages {
                builder = builder.with_message(message.clone());
            }
        }
        for key in &self.extra {
            if let Some(value) = snapshot.extra.get(key) {
                builder = builder.with_extra(key, value.clone());
            }
        }
        for list in &self.accum {
            for value in snapshot.accum_list(list) {
                builder = builder.with_accum_entry(list, value.clone());
            }
        }
        builder.build()
    }

    /// Project a child's final state into a partial update for the parent.
    #[must_use]
    pub fn project_partial(&self, state: &VersionedState) -> NodePartial {
        let mut partial = NodePartial::new();
        if self.messages {
            partial.messages = Some(state.messages.snapshot());
        }
        let extra: FxHashMap<String, Value> = self
            .extra
            .iter()
            .filter_map(|k| state.extra.get().get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        if !extra.is_empty() {
            partial.extra = Some(extra);
        }
        let accum: FxHashMap<String, Vec<Value>> = self
            .accum
            .iter()
            .filter_map(|k| state.accum.get().get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        if !accum.is_empty() {
            partial.accum = Some(accum);
        }
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_narrows_state() {
        let state = VersionedState::builder()
            .with_user_message("research rust")
            .with_extra("topic", json!("rust"))
            .with_extra("depth", json!("standard"))
            .with_extra("internal_only", json!(true))
            .build();

        let projection = Projection::extra_keys(&["topic", "depth"]);
        let child = projection.project_state(&state.snapshot());
        let snap = child.snapshot();
        assert!(snap.messages.is_empty());
        assert_eq!(snap.extra.len(), 2);
        assert!(!snap.extra.contains_key("internal_only"));
    }

    #[test]
    fn projection_reads_back_partial() {
        let mut state = VersionedState::builder()
            .with_extra("report", json!({"title": "T"}))
            .build();
        state.add_extra("scratch", json!(1));

        let projection = Projection::extra_keys(&["report"]);
        let partial = projection.project_partial(&state);
        let extra = partial.extra.unwrap();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra["report"]["title"], "T");
    }
}
