//! In-memory session state persisted across supersteps.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::control::FrontierEntry;
use crate::interrupts::{InterruptToken, ResumeEnvelope};
use crate::state::VersionedState;

/// Lifecycle of a run.
///
/// `Running -> {Interrupted, Completed, Failed}`; `Interrupted -> Running`
/// on a valid resume. `Completed` conversations can be re-opened with new
/// input under the same session id; `Failed` is terminal for the run but
/// the checkpoint history stays readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Interrupted,
    Completed,
    Failed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "interrupted" => SessionStatus::Interrupted,
            "completed" => SessionStatus::Completed,
            "failed" => SessionStatus::Failed,
            _ => SessionStatus::Running,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Everything a run needs to continue from where it left off.
#[derive(Clone, Debug)]
pub struct SessionState {
    /// The versioned channel state.
    pub state: VersionedState,
    /// The last completed superstep number.
    pub step: u64,
    /// Entries to execute next.
    pub frontier: Vec<FrontierEntry>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// The single pending interrupt, when `status` is `Interrupted`.
    pub pending_interrupt: Option<InterruptToken>,
    /// Transient resume envelope consumed by the next superstep; never
    /// persisted.
    pub resume: Option<Arc<ResumeEnvelope>>,
    /// Fan-out concurrency limit for this session.
    pub concurrency_limit: usize,
}

/// How a session was initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInit {
    /// A brand new session was created.
    Fresh,
    /// An existing session was restored from a checkpoint.
    Resumed { checkpoint_step: u64 },
}

/// Channel versions after a step, for change tracking in step reports.
#[derive(Debug, Clone)]
pub struct StateVersions {
    pub messages_version: u32,
    pub extra_version: u32,
    pub accum_version: u32,
}

impl StateVersions {
    pub fn of(state: &VersionedState) -> Self {
        use crate::channels::Channel;
        Self {
            messages_version: state.messages.version(),
            extra_version: state.extra.version(),
            accum_version: state.accum.version(),
        }
    }
}
