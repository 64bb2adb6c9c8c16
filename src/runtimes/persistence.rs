/*!
Serde-friendly persistence models for checkpoints.

Design goals:
- Explicit persisted structs decoupled from in-memory representations.
- Conversion logic localized in `From` / `TryFrom` impls so checkpointer
  backends stay lean and declarative.
- Forward compatibility: unknown `NodeKind` encodings round-trip as
  `NodeKind::Custom(encoded_string)`, report fields default when absent.

This module performs no I/O.
*/

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    channels::{AccumChannel, Channel, ErrorsChannel, ExtrasChannel, MessagesChannel},
    control::FrontierEntry,
    interrupts::InterruptToken,
    message::Message,
    runtimes::checkpointer::Checkpoint,
    runtimes::session::SessionStatus,
    state::VersionedState,
    types::NodeKind,
};

/// Channel storing a vector collection with version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// Channel storing a map collection with version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedMapChannel<V> {
    pub version: u32,
    #[serde(default)]
    pub map: FxHashMap<String, V>,
}

impl<V> Default for PersistedMapChannel<V> {
    fn default() -> Self {
        Self {
            version: 1,
            map: FxHashMap::default(),
        }
    }
}

/// Complete persisted shape of the in-memory `VersionedState`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    pub messages: PersistedVecChannel<Message>,
    pub extra: PersistedMapChannel<Value>,
    #[serde(default)]
    pub accum: PersistedMapChannel<Vec<Value>>,
    #[serde(default)]
    pub errors: PersistedVecChannel<crate::channels::errors::ErrorEvent>,
}

/// Frontier entry with its fan-out overlay, node encoded as a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedFrontierEntry {
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<FxHashMap<String, Value>>,
}

/// Full persisted checkpoint representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub session_id: String,
    pub step: u64,
    pub status: String,
    pub state: PersistedState,
    pub frontier: Vec<PersistedFrontierEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<InterruptToken>,
    pub concurrency_limit: usize,
    /// RFC3339 creation time.
    pub created_at: String,
    #[serde(default)]
    pub ran_nodes: Vec<String>,
    #[serde(default)]
    pub skipped_nodes: Vec<String>,
    #[serde(default)]
    pub updated_channels: Vec<String>,
}

/// Conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(dialogweave::persistence::serde),
        help("Ensure the JSON structure matches the Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("persistence error: {0}")]
    #[diagnostic(code(dialogweave::persistence::other))]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|source| PersistenceError::Serde { source })
}

pub fn from_json_str<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|source| PersistenceError::Serde { source })
}

/* ---------- VersionedState <-> PersistedState ---------- */

impl From<&VersionedState> for PersistedState {
    fn from(s: &VersionedState) -> Self {
        PersistedState {
            messages: PersistedVecChannel {
                version: s.messages.version(),
                items: s.messages.snapshot(),
            },
            extra: PersistedMapChannel {
                version: s.extra.version(),
                map: s.extra.snapshot(),
            },
            accum: PersistedMapChannel {
                version: s.accum.version(),
                map: s.accum.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl From<PersistedState> for VersionedState {
    fn from(p: PersistedState) -> Self {
        VersionedState {
            messages: MessagesChannel::new(p.messages.items, p.messages.version),
            extra: ExtrasChannel::new(p.extra.map, p.extra.version),
            accum: AccumChannel::new(p.accum.map, p.accum.version),
            errors: ErrorsChannel::new(p.errors.items, p.errors.version),
        }
    }
}

/* ---------- FrontierEntry <-> PersistedFrontierEntry ---------- */

impl From<&FrontierEntry> for PersistedFrontierEntry {
    fn from(entry: &FrontierEntry) -> Self {
        PersistedFrontierEntry {
            node: entry.kind.encode(),
            overlay: entry.overlay.clone(),
        }
    }
}

impl From<PersistedFrontierEntry> for FrontierEntry {
    fn from(p: PersistedFrontierEntry) -> Self {
        FrontierEntry {
            kind: NodeKind::decode(&p.node),
            overlay: p.overlay,
        }
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            session_id: cp.session_id.clone(),
            step: cp.step,
            status: cp.status.as_str().to_string(),
            state: PersistedState::from(&cp.state),
            frontier: cp.frontier.iter().map(PersistedFrontierEntry::from).collect(),
            pending_interrupt: cp.pending_interrupt.clone(),
            concurrency_limit: cp.concurrency_limit,
            created_at: cp.created_at.to_rfc3339(),
            ran_nodes: cp.ran_nodes.iter().map(|k| k.encode()).collect(),
            skipped_nodes: cp.skipped_nodes.iter().map(|k| k.encode()).collect(),
            updated_channels: cp.updated_channels.clone(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            session_id: p.session_id,
            step: p.step,
            status: SessionStatus::parse(&p.status),
            state: VersionedState::from(p.state),
            frontier: p.frontier.into_iter().map(FrontierEntry::from).collect(),
            pending_interrupt: p.pending_interrupt,
            concurrency_limit: p.concurrency_limit,
            created_at,
            ran_nodes: p.ran_nodes.iter().map(|s| NodeKind::decode(s)).collect(),
            skipped_nodes: p.skipped_nodes.iter().map(|s| NodeKind::decode(s)).collect(),
            updated_channels: p.updated_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkpoint_roundtrip_preserves_interrupt() {
        use crate::interrupts::InterruptKind;
        let mut state = VersionedState::new_with_user_message("hello");
        state.add_extra("topic", json!("rust"));
        let checkpoint = Checkpoint {
            session_id: "sess".into(),
            step: 4,
            state,
            frontier: vec![FrontierEntry::node(NodeKind::Custom("deep_research".into()))],
            status: SessionStatus::Interrupted,
            pending_interrupt: Some(InterruptToken {
                id: "tok".into(),
                node: NodeKind::Custom("clarify".into()),
                path: vec!["deep_research".into(), "clarify".into()],
                kind: InterruptKind::Checkbox,
                payload: json!({"options": []}),
                raised_at: Utc::now(),
            }),
            concurrency_limit: 4,
            created_at: Utc::now(),
            ran_nodes: vec![NodeKind::Custom("deep_research".into())],
            skipped_nodes: vec![],
            updated_channels: vec!["extra".into()],
        };

        let persisted = PersistedCheckpoint::from(&checkpoint);
        let text = to_json_string(&persisted).unwrap();
        let reloaded: PersistedCheckpoint = from_json_str(&text).unwrap();
        let restored = Checkpoint::from(reloaded);

        assert_eq!(restored.step, 4);
        assert_eq!(restored.status, SessionStatus::Interrupted);
        let token = restored.pending_interrupt.unwrap();
        assert_eq!(token.path, vec!["deep_research", "clarify"]);
        assert_eq!(restored.frontier, checkpoint.frontier);
    }
}
