//! Structured error events accumulated in the errors channel.
//!
//! Nodes can report recoverable problems (a failed web search, a degraded
//! retrieval) without aborting the run by adding [`ErrorEvent`]s to their
//! partial update. Fatal failures use `NodeError` instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An error event with scope, cause chain, tags, and free-form context.
///
/// Serializes with a tagged `scope` union (`"node"`, `"scheduler"`,
/// `"runner"`, `"app"`) so downstream consumers can filter by origin:
///
/// ```
/// use dialogweave::channels::errors::{ErrorEvent, ErrorChain};
/// use serde_json::json;
///
/// let event = ErrorEvent::node("explorer", 4, ErrorChain::msg("search timed out"))
///     .with_tag("web_search")
///     .with_context(json!({"query": "rust async"}));
/// let text = serde_json::to_string(&event).unwrap();
/// assert!(text.contains("\"scope\":\"node\""));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: ErrorChain,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl ErrorEvent {
    /// Create a node-scoped error event.
    pub fn node<S: Into<String>>(kind: S, step: u64, error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Node {
                kind: kind.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a scheduler-scoped error event.
    pub fn scheduler(step: u64, error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Scheduler { step },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a runner-scoped error event.
    pub fn runner<S: Into<String>>(session: S, step: u64, error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Runner {
                session: session.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an app-scoped error event.
    pub fn app(error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::App,
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Where in the engine an error originated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    Node {
        kind: String,
        step: u64,
    },
    Scheduler {
        step: u64,
    },
    Runner {
        session: String,
        step: u64,
    },
    #[default]
    App,
}

/// A message with an optional nested cause, preserving error chains across
/// serialization boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorChain {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorChain>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for ErrorChain {
    fn default() -> Self {
        ErrorChain {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorChain {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl ErrorChain {
    pub fn msg<M: Into<String>>(m: M) -> Self {
        ErrorChain {
            message: m.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_cause(mut self, cause: ErrorChain) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}
