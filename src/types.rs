//! Core identifier types for the dialogweave workflow engine.
//!
//! These types name the two fundamental concepts a workflow is built from:
//! nodes ([`NodeKind`]) and state channels ([`ChannelType`]). Runtime-only
//! types (session state, step reports) live in [`crate::runtimes`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// `Start` and `End` are virtual endpoints: they are never registered or
/// executed, they only anchor the graph's entry and exit edges. Every
/// executable node is a `Custom` kind named by the application.
///
/// # Persistence
///
/// `NodeKind` round-trips through a human-readable string form via
/// [`encode`](Self::encode) / [`decode`](Self::decode) so checkpoints stay
/// inspectable:
///
/// ```rust
/// use dialogweave::types::NodeKind;
///
/// let agent = NodeKind::Custom("agent".to_string());
/// assert_eq!(agent.encode(), "Custom:agent");
/// assert_eq!(NodeKind::decode("Custom:agent"), agent);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point; the first edge of every graph leaves from here.
    Start,
    /// Virtual exit; routing to `End` completes that branch of the run.
    End,
    /// An executable node named by the application (e.g. `"agent"`,
    /// `"clarify"`, `"explorer"`).
    Custom(String),
}

impl NodeKind {
    /// Encode into the persisted string form (`"Start"`, `"End"`,
    /// `"Custom:<name>"`).
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode a persisted string back into a `NodeKind`.
    ///
    /// Unknown encodings fall back to `Custom(s)` so old checkpoints keep
    /// loading after renames.
    pub fn decode(s: &str) -> Self {
        if s == "Start" {
            NodeKind::Start
        } else if s == "End" {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    /// The bare node name, without the `Custom:` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::End => "End",
            NodeKind::Custom(name) => name,
        }
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// Developer experience: allow string literals where a NodeKind is expected.
impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

/// Identifies one of the state channels managed by the engine.
///
/// Each channel has its own merge policy, applied by the matching reducer:
///
/// - `Message`: conversation history, append-only
/// - `Extra`: JSON key/value scratch space, last-writer-wins per key
/// - `Accum`: named append-accumulate lists (e.g. `research_reports`);
///   entries are never removed within a run
/// - `Error`: non-fatal error events, append-only
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Message,
    Extra,
    Accum,
    Error,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Extra => write!(f, "extra"),
            Self::Accum => write!(f, "accum"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        for kind in [
            NodeKind::Start,
            NodeKind::End,
            NodeKind::Custom("agent".into()),
        ] {
            assert_eq!(NodeKind::decode(&kind.encode()), kind);
        }
    }

    #[test]
    fn unknown_encoding_becomes_custom() {
        assert_eq!(
            NodeKind::decode("legacy_node"),
            NodeKind::Custom("legacy_node".into())
        );
    }

    #[test]
    fn from_str_maps_virtual_endpoints() {
        assert_eq!(NodeKind::from("Start"), NodeKind::Start);
        assert_eq!(NodeKind::from("End"), NodeKind::End);
        assert_eq!(NodeKind::from("agent"), NodeKind::Custom("agent".into()));
    }
}
