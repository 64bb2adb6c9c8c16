//! Checkpoint model and pluggable persistence.
//!
//! The checkpointer is the engine's only durability dependency: an
//! append-only, crash-consistent store keyed by `(session_id, step)`.
//! Existing checkpoints are never overwritten; a run's history is a
//! strictly monotonic sequence of steps, and replaying it with identical
//! collaborator responses reproduces the same state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::control::FrontierEntry;
use crate::interrupts::InterruptToken;
use crate::runtimes::session::{SessionState, SessionStatus};
use crate::state::VersionedState;
use crate::types::NodeKind;

/// Durable snapshot of a run after one superstep.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub session_id: String,
    pub step: u64,
    pub state: VersionedState,
    pub frontier: Vec<FrontierEntry>,
    pub status: SessionStatus,
    /// Present exactly when the run is suspended waiting for human input.
    pub pending_interrupt: Option<InterruptToken>,
    pub concurrency_limit: usize,
    pub created_at: DateTime<Utc>,
    /// Nodes that executed in this step.
    pub ran_nodes: Vec<NodeKind>,
    /// Nodes that were skipped (virtual endpoints).
    pub skipped_nodes: Vec<NodeKind>,
    /// Channels the step's barrier updated.
    pub updated_channels: Vec<String>,
}

impl Checkpoint {
    /// Snapshot a session. Step report fields start empty; the runner fills
    /// them via [`with_step_report`](Self::with_step_report).
    pub fn from_session(session_id: &str, session: &SessionState) -> Self {
        Self {
            session_id: session_id.to_string(),
            step: session.step,
            state: session.state.clone(),
            frontier: session.frontier.clone(),
            status: session.status,
            pending_interrupt: session.pending_interrupt.clone(),
            concurrency_limit: session.concurrency_limit,
            created_at: Utc::now(),
            ran_nodes: Vec::new(),
            skipped_nodes: Vec::new(),
            updated_channels: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_step_report(
        mut self,
        ran_nodes: Vec<NodeKind>,
        skipped_nodes: Vec<NodeKind>,
        updated_channels: Vec<String>,
    ) -> Self {
        self.ran_nodes = ran_nodes;
        self.skipped_nodes = skipped_nodes;
        self.updated_channels = updated_channels;
        self
    }
}

/// Rebuild in-memory session state from a stored checkpoint.
pub fn restore_session_state(checkpoint: &Checkpoint) -> SessionState {
    SessionState {
        state: checkpoint.state.clone(),
        step: checkpoint.step,
        frontier: checkpoint.frontier.clone(),
        status: checkpoint.status,
        pending_interrupt: checkpoint.pending_interrupt.clone(),
        resume: None,
        concurrency_limit: checkpoint.concurrency_limit,
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    /// An append targeted a `(session, step)` pair that already exists.
    #[error("checkpoint for session {session_id} step {step} already exists")]
    #[diagnostic(
        code(dialogweave::checkpointer::duplicate_step),
        help("Checkpoints are append-only; steps are never overwritten.")
    )]
    DuplicateStep { session_id: String, step: u64 },

    #[error("checkpoint serialization failed: {message}")]
    #[diagnostic(code(dialogweave::checkpointer::serialization))]
    Serialization { message: String },

    #[error("checkpoint backend error: {0}")]
    #[diagnostic(code(dialogweave::checkpointer::backend))]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Persistence backend selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    InMemory,
    #[cfg(feature = "sqlite")]
    SQLite,
}

/// Pluggable checkpoint persistence.
///
/// Implementations must be crash-consistent (a partially written
/// checkpoint is never visible to `load_latest`) and must support
/// concurrent access keyed by session id without cross-session
/// interference.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Append a checkpoint. Fails with
    /// [`CheckpointerError::DuplicateStep`] instead of overwriting.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// The highest-step checkpoint for a session, if any.
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>>;

    /// Full checkpoint history for a session, ordered by step.
    async fn load_history(&self, session_id: &str) -> Result<Vec<Checkpoint>>;

    /// All known session ids.
    async fn list_sessions(&self) -> Result<Vec<String>>;
}

/// Volatile checkpointer for tests and development. Histories live only as
/// long as the process, but the append-only contract is enforced the same
/// way the durable backends do.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    inner: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share one in-memory store across runners (parent and sub-workflow
    /// runners must see the same history).
    pub fn shared() -> Arc<dyn Checkpointer> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut inner = self.inner.write().await;
        let history = inner.entry(checkpoint.session_id.clone()).or_default();
        if history.iter().any(|cp| cp.step == checkpoint.step) {
            return Err(CheckpointerError::DuplicateStep {
                session_id: checkpoint.session_id,
                step: checkpoint.step,
            });
        }
        history.push(checkpoint);
        history.sort_by_key(|cp| cp.step);
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let inner = self.inner.read().await;
        Ok(inner
            .get(session_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let inner = self.inner.read().await;
        Ok(inner.get(session_id).cloned().unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.keys().cloned().collect())
    }
}
