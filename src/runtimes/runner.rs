//! Runtime execution engine: sessions, the step loop, interrupts, and
//! resume.
//!
//! `AppRunner` wraps a compiled [`App`] with everything execution needs:
//! session management, checkpointing after every superstep, interrupt
//! bookkeeping, and event emission. One logical step loop runs per
//! session; fan-out batches inside a step are the only intra-run
//! concurrency. A sub-workflow adapter builds a nested runner via
//! [`AppRunner::for_subworkflow`], sharing the parent's checkpointer and
//! event channel so a single persisted history and a single event stream
//! cover both graphs.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

use crate::app::{App, BarrierOutcome};
use crate::control::{FrontierEntry, RouteTarget};
use crate::event_bus::{Event, EventBus, EventStream, STREAM_END_SCOPE};
use crate::interrupts::{
    InterruptRequest, InterruptToken, ResumeEnvelope, ResumeShapeError, validate_resume_value,
};
use crate::node::NodePartial;
use crate::runtimes::checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    restore_session_state,
};
use crate::runtimes::session::{SessionInit, SessionState, SessionStatus, StateVersions};
use crate::schedulers::{ContextSeed, Scheduler, SchedulerError};
use crate::state::{StateSnapshot, VersionedState};
use crate::types::NodeKind;
use crate::utils::id_generator::IdGenerator;

/// Result of executing one superstep.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: u64,
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
    pub barrier_outcome: BarrierOutcome,
    pub next_frontier: Vec<FrontierEntry>,
    pub state_versions: StateVersions,
    pub completed: bool,
}

/// How a run settled: finished, or parked on a pending interrupt.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(VersionedState),
    Interrupted(InterruptToken),
}

impl RunOutcome {
    /// The final state, when the run completed.
    #[must_use]
    pub fn into_state(self) -> Option<VersionedState> {
        match self {
            RunOutcome::Completed(state) => Some(state),
            RunOutcome::Interrupted(_) => None,
        }
    }

    /// The pending token, when the run interrupted.
    #[must_use]
    pub fn interrupt(&self) -> Option<&InterruptToken> {
        match self {
            RunOutcome::Interrupted(token) => Some(token),
            RunOutcome::Completed(_) => None,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("session not found: {session_id}")]
    #[diagnostic(code(dialogweave::runner::session_not_found))]
    SessionNotFound { session_id: String },

    #[error("no nodes to run from Start (empty frontier)")]
    #[diagnostic(
        code(dialogweave::runner::no_start_nodes),
        help("Add edges from Start or set the entry node correctly.")
    )]
    NoStartNodes,

    #[error("session {session_id} exceeded the step limit of {limit}")]
    #[diagnostic(
        code(dialogweave::runner::step_limit),
        help("A cycle is not converging. Inspect the checkpoint history to see which nodes loop.")
    )]
    StepLimitExceeded { session_id: String, limit: u64 },

    #[error("session {session_id} has no pending interrupt to resume")]
    #[diagnostic(code(dialogweave::runner::no_pending_interrupt))]
    NoPendingInterrupt { session_id: String },

    #[error(transparent)]
    #[diagnostic(code(dialogweave::runner::invalid_resume_value))]
    InvalidResumeValue(#[from] ResumeShapeError),

    #[error("session {session_id} previously failed; start a new run")]
    #[diagnostic(code(dialogweave::runner::session_failed))]
    SessionFailed { session_id: String },

    #[error("workflow task join error: {0}")]
    #[diagnostic(code(dialogweave::runner::join))]
    Join(#[from] JoinError),

    #[error(transparent)]
    #[diagnostic(code(dialogweave::runner::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error("barrier error: {0}")]
    #[diagnostic(code(dialogweave::runner::barrier))]
    AppBarrier(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    #[diagnostic(code(dialogweave::runner::scheduler))]
    Scheduler(#[from] SchedulerError),
}

/// Runtime execution engine for compiled workflows.
///
/// # App vs AppRunner
///
/// - **`App`**: the immutable graph (nodes, edges, schema, projections)
/// - **`AppRunner`**: the runtime environment (sessions, events,
///   checkpoints)
///
/// One `App` can back many runners; each runner's event bus is isolated,
/// which is what per-request streaming in a server wants. For
/// interrupt/resume round-trips, keep one runner alive: with the
/// in-memory checkpointer it is the only holder of the history.
///
/// # Example
///
/// ```rust,no_run
/// use dialogweave::runtimes::{AppRunner, CheckpointerType, RunOutcome};
/// use dialogweave::state::VersionedState;
/// use serde_json::json;
/// # async fn example(app: dialogweave::app::App) -> Result<(), Box<dyn std::error::Error>> {
/// let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
/// runner
///     .create_session("thread-1".into(), VersionedState::new_with_user_message("hi"))
///     .await?;
///
/// match runner.run_until_settled("thread-1").await? {
///     RunOutcome::Completed(state) => println!("done: {} messages", state.messages.len()),
///     RunOutcome::Interrupted(token) => {
///         // show token.payload to the human, then:
///         runner.resume("thread-1", json!(["topic_0"])).await?;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct AppRunner {
    app: Arc<App>,
    sessions: FxHashMap<String, SessionState>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    autosave: bool,
    event_bus: Option<EventBus>,
    event_sender: flume::Sender<Event>,
    scope_path: Vec<String>,
    default_concurrency: usize,
}

impl AppRunner {
    /// Create a runner with the app's configured event bus and autosave on.
    pub async fn new(app: App, checkpointer_type: CheckpointerType) -> Self {
        Self::with_options(app, checkpointer_type, true).await
    }

    /// Create a runner with an explicit autosave toggle.
    pub async fn with_options(app: App, checkpointer_type: CheckpointerType, autosave: bool) -> Self {
        let bus = app.runtime_config().event_bus.build_event_bus();
        Self::with_options_and_bus(app, checkpointer_type, autosave, bus, true).await
    }

    /// Create a runner with a custom event bus — the entry point for
    /// per-request streaming setups.
    pub async fn with_options_and_bus(
        app: App,
        checkpointer_type: CheckpointerType,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        let app = Arc::new(app);
        let sqlite_db_name = app.runtime_config().sqlite_db_name.clone();
        let checkpointer = Self::create_checkpointer(checkpointer_type, sqlite_db_name).await;
        if start_listener {
            event_bus.listen_for_events();
        }
        let event_sender = event_bus.get_sender();
        Self {
            app,
            sessions: FxHashMap::default(),
            checkpointer,
            autosave,
            event_bus: Some(event_bus),
            event_sender,
            scope_path: Vec::new(),
            default_concurrency: default_concurrency(),
        }
    }

    /// Create a runner with an explicit shared checkpointer.
    pub fn with_checkpointer(app: App, checkpointer: Arc<dyn Checkpointer>) -> Self {
        let event_bus = app.runtime_config().event_bus.build_event_bus();
        event_bus.listen_for_events();
        let event_sender = event_bus.get_sender();
        Self {
            app: Arc::new(app),
            sessions: FxHashMap::default(),
            checkpointer: Some(checkpointer),
            autosave: true,
            event_bus: Some(event_bus),
            event_sender,
            scope_path: Vec::new(),
            default_concurrency: default_concurrency(),
        }
    }

    /// Nested runner driven by a sub-workflow adapter: shares the parent's
    /// checkpointer and event channel, owns no bus, and tags everything it
    /// emits with `scope_path`.
    pub fn for_subworkflow(
        app: Arc<App>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        event_sender: flume::Sender<Event>,
        scope_path: Vec<String>,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            app,
            sessions: FxHashMap::default(),
            checkpointer,
            autosave: true,
            event_bus: None,
            event_sender,
            scope_path,
            default_concurrency: concurrency_limit.max(1),
        }
    }

    async fn create_checkpointer(
        checkpointer_type: CheckpointerType,
        #[cfg_attr(not(feature = "sqlite"), allow(unused_variables))] sqlite_db_name: Option<String>,
    ) -> Option<Arc<dyn Checkpointer>> {
        match checkpointer_type {
            CheckpointerType::InMemory => Some(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "sqlite")]
            CheckpointerType::SQLite => {
                let db_url = std::env::var("DIALOGWEAVE_SQLITE_URL")
                    .ok()
                    .or_else(|| sqlite_db_name.as_ref().map(|name| format!("sqlite://{name}")))
                    .unwrap_or_else(|| "sqlite://dialogweave.db".to_string());
                if let Some(path) = db_url.strip_prefix("sqlite://") {
                    let path = path.trim();
                    if !path.is_empty() {
                        let p = std::path::Path::new(path);
                        if let Some(parent) = p.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if !p.exists() {
                            let _ = std::fs::File::create_new(p);
                        }
                    }
                }
                match crate::runtimes::SQLiteCheckpointer::connect(&db_url).await {
                    Ok(cp) => Some(Arc::new(cp) as Arc<dyn Checkpointer>),
                    Err(e) => {
                        tracing::error!(url = %db_url, error = %e, "SQLiteCheckpointer initialization failed");
                        None
                    }
                }
            }
        }
    }

    fn is_root(&self) -> bool {
        self.scope_path.is_empty()
    }

    /// Subscribe to this runner's event bus. `None` for nested runners,
    /// which forward into the parent's channel instead.
    pub fn subscribe(&self) -> Option<EventStream> {
        self.event_bus.as_ref().map(|bus| bus.subscribe())
    }

    /// The shared checkpointer, when persistence is configured.
    pub fn checkpointer(&self) -> Option<Arc<dyn Checkpointer>> {
        self.checkpointer.clone()
    }

    #[must_use]
    pub fn get_session(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    #[must_use]
    pub fn list_sessions(&self) -> Vec<&String> {
        self.sessions.keys().collect()
    }

    fn start_frontier(&self) -> Result<Vec<FrontierEntry>, RunnerError> {
        let frontier: Vec<FrontierEntry> = self
            .app
            .edges()
            .get(&NodeKind::Start)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(FrontierEntry::node)
            .collect();
        if frontier.is_empty() {
            return Err(RunnerError::NoStartNodes);
        }
        Ok(frontier)
    }

    /// Re-open a settled conversation with fresh input: append the new
    /// messages, merge the new extras, and reset the frontier to Start.
    fn reopen_session(
        &self,
        session: &mut SessionState,
        initial_state: VersionedState,
    ) -> Result<(), RunnerError> {
        use crate::channels::Channel;
        let snapshot = initial_state.snapshot();
        session
            .state
            .messages
            .get_mut()
            .extend(snapshot.messages.into_iter());
        for (k, v) in snapshot.extra {
            session.state.extra.get_mut().insert(k, v);
        }
        session.frontier = self.start_frontier()?;
        session.status = SessionStatus::Running;
        session.pending_interrupt = None;
        session.resume = None;
        Ok(())
    }

    /// Initialize a session, restoring from the latest checkpoint when one
    /// exists. A restored conversation that already settled is re-opened
    /// with the new input; an interrupted one is left pending (callers
    /// resume it instead).
    #[instrument(skip(self, initial_state, session_id), err)]
    pub async fn create_session(
        &mut self,
        session_id: String,
        initial_state: VersionedState,
    ) -> Result<SessionInit, RunnerError> {
        let restored_checkpoint = if let Some(cp) = &self.checkpointer {
            cp.load_latest(&session_id).await?
        } else {
            None
        };

        if let Some(stored) = restored_checkpoint {
            let mut restored = restore_session_state(&stored);
            if restored.status.is_terminal() {
                self.reopen_session(&mut restored, initial_state)?;
            }
            self.sessions.insert(session_id, restored);
            return Ok(SessionInit::Resumed {
                checkpoint_step: stored.step,
            });
        }

        // No checkpointer (or empty history) but a live in-memory session:
        // same re-open semantics.
        if let Some(existing) = self.sessions.get_mut(&session_id) {
            let step = existing.step;
            if existing.status.is_terminal() {
                let mut reopened = existing.clone();
                self.reopen_session(&mut reopened, initial_state)?;
                self.sessions.insert(session_id, reopened);
            }
            return Ok(SessionInit::Resumed {
                checkpoint_step: step,
            });
        }

        let session_state = SessionState {
            state: initial_state,
            step: 0,
            frontier: self.start_frontier()?,
            status: SessionStatus::Running,
            pending_interrupt: None,
            resume: None,
            concurrency_limit: self.default_concurrency,
        };
        self.sessions
            .insert(session_id.clone(), session_state.clone());
        self.persist(&session_id).await?;
        Ok(SessionInit::Fresh)
    }

    /// Drive the session until it settles: completed, interrupted, or
    /// failed.
    ///
    /// Every superstep is checkpointed (none skipped); the checkpoint that
    /// records a pending interrupt is durable before the interrupt event
    /// reaches any consumer. The configured step ceiling converts runaway
    /// cycles into [`RunnerError::StepLimitExceeded`] with the last good
    /// checkpoint intact.
    #[instrument(skip(self), err)]
    pub async fn run_until_settled(
        &mut self,
        session_id: &str,
    ) -> Result<RunOutcome, RunnerError> {
        let step_limit = self.app.runtime_config().step_limit;

        {
            let session =
                self.sessions
                    .get(session_id)
                    .ok_or_else(|| RunnerError::SessionNotFound {
                        session_id: session_id.to_string(),
                    })?;
            if session.status == SessionStatus::Failed {
                return Err(RunnerError::SessionFailed {
                    session_id: session_id.to_string(),
                });
            }
            if session.status == SessionStatus::Interrupted && session.resume.is_none() {
                // Nothing to do until a resume value arrives.
                let token = session
                    .pending_interrupt
                    .clone()
                    .ok_or_else(|| RunnerError::NoPendingInterrupt {
                        session_id: session_id.to_string(),
                    })?;
                return Ok(RunOutcome::Interrupted(token));
            }
        }

        if self.is_root() {
            let _ = self.event_sender.send(Event::run_started(session_id));
        }
        tracing::info!(session = %session_id, "workflow run started");

        // The ceiling bounds supersteps per run invocation; a long
        // conversation accumulates steps across many runs without
        // tripping it.
        let mut steps_this_run: u64 = 0;

        loop {
            let (status, step, frontier_terminal) = {
                let session = self
                    .sessions
                    .get(session_id)
                    .ok_or_else(|| RunnerError::SessionNotFound {
                        session_id: session_id.to_string(),
                    })?;
                (
                    session.status,
                    session.step,
                    session.frontier.is_empty()
                        || session.frontier.iter().all(|e| e.kind.is_end()),
                )
            };

            match status {
                SessionStatus::Completed => break,
                SessionStatus::Failed => {
                    self.finalize(session_id, "failed", Some(step));
                    return Err(RunnerError::SessionFailed {
                        session_id: session_id.to_string(),
                    });
                }
                SessionStatus::Interrupted => {
                    // A fresh interrupt was raised inside this loop.
                    let token = self
                        .sessions
                        .get(session_id)
                        .and_then(|s| s.pending_interrupt.clone())
                        .ok_or_else(|| RunnerError::NoPendingInterrupt {
                            session_id: session_id.to_string(),
                        })?;
                    self.finalize(session_id, "interrupted", Some(step));
                    return Ok(RunOutcome::Interrupted(token));
                }
                SessionStatus::Running => {}
            }

            if frontier_terminal {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.status = SessionStatus::Completed;
                }
                break;
            }

            if steps_this_run >= step_limit {
                if let Some(session) = self.sessions.get_mut(session_id) {
                    session.status = SessionStatus::Failed;
                }
                let error = RunnerError::StepLimitExceeded {
                    session_id: session_id.to_string(),
                    limit: step_limit,
                };
                if self.is_root() {
                    let _ = self.event_sender.send(Event::run_failed(
                        session_id,
                        Some(step),
                        error.to_string(),
                    ));
                }
                self.finalize(session_id, "failed", Some(step));
                return Err(error);
            }

            let report = match self.run_step(session_id).await {
                Ok(report) => report,
                Err(error) => {
                    let step = self.sessions.get(session_id).map(|s| s.step);
                    if self.is_root() {
                        let _ = self.event_sender.send(Event::run_failed(
                            session_id,
                            step,
                            error.to_string(),
                        ));
                    }
                    self.finalize(session_id, "failed", step);
                    return Err(error);
                }
            };
            steps_this_run += 1;

            if report.completed {
                break;
            }
        }

        tracing::info!(session = %session_id, "workflow run completed");
        let (final_state, final_step) = {
            let session = self
                .sessions
                .get(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
            (session.state.clone(), session.step)
        };
        if self.is_root() {
            let _ = self
                .event_sender
                .send(Event::run_finished(session_id, final_step));
        }
        self.finalize(session_id, "completed", Some(final_step));
        Ok(RunOutcome::Completed(final_state))
    }

    /// Supply the resume value for the pending interrupt and continue.
    ///
    /// Fails with [`RunnerError::NoPendingInterrupt`] when nothing is
    /// pending, and with [`RunnerError::InvalidResumeValue`] (no state
    /// change, run still interrupted) when the value's shape does not
    /// match the token.
    #[instrument(skip(self, value), err)]
    pub async fn resume(
        &mut self,
        session_id: &str,
        value: serde_json::Value,
    ) -> Result<RunOutcome, RunnerError> {
        if !self.sessions.contains_key(session_id)
            && let Some(cp) = &self.checkpointer
            && let Some(stored) = cp.load_latest(session_id).await?
        {
            self.sessions
                .insert(session_id.to_string(), restore_session_state(&stored));
        }

        let session =
            self.sessions
                .get_mut(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;
        let token = session
            .pending_interrupt
            .clone()
            .ok_or_else(|| RunnerError::NoPendingInterrupt {
                session_id: session_id.to_string(),
            })?;

        validate_resume_value(token.kind, &value)?;

        session.status = SessionStatus::Running;
        session.resume = Some(Arc::new(ResumeEnvelope { token, value }));
        session.pending_interrupt = None;

        self.run_until_settled(session_id).await
    }

    /// Execute exactly one superstep, checkpoint it, and emit the interrupt
    /// event when the step suspended the run.
    async fn run_step(&mut self, session_id: &str) -> Result<StepReport, RunnerError> {
        let mut session =
            self.sessions
                .remove(session_id)
                .ok_or_else(|| RunnerError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;

        let result = self.execute_superstep(session_id, &mut session).await;
        if result.is_err() {
            session.status = SessionStatus::Failed;
        }
        let interrupted = session.pending_interrupt.clone();
        self.sessions.insert(session_id.to_string(), session);

        let report = result?;
        self.persist_with_report(session_id, &report).await?;

        // Durable before observable: the interrupt event goes out only
        // after the checkpoint carrying the token is stored.
        if let Some(token) = interrupted
            && self.is_root()
        {
            let _ = self.event_sender.send(Event::interrupt(session_id, &token));
        }

        Ok(report)
    }

    /// One superstep: schedule the frontier, merge outputs at the barrier,
    /// mint an interrupt token if a node suspended, and compute the next
    /// frontier.
    #[instrument(skip(self, session), err)]
    async fn execute_superstep(
        &self,
        session_id: &str,
        session: &mut SessionState,
    ) -> Result<StepReport, RunnerError> {
        session.step += 1;
        let step = session.step;
        tracing::debug!(step, frontier_len = session.frontier.len(), "starting superstep");

        let snapshot = session.state.snapshot();
        let resume = session
            .resume
            .take()
            .map(|envelope| (envelope.token.resume_target(), envelope));
        let seed = ContextSeed {
            session_id: session_id.to_string(),
            path: self.scope_path.clone(),
            event_sender: self.event_sender.clone(),
            checkpointer: self.checkpointer.clone(),
            concurrency_limit: session.concurrency_limit,
            resume,
        };

        let scheduler = Scheduler::new(session.concurrency_limit);
        let run_result = scheduler
            .superstep(self.app.nodes(), &session.frontier, snapshot, step, seed)
            .await?;

        // Split updates from interrupt requests, preserving frontier order.
        let mut update_nodes: Vec<NodeKind> = Vec::new();
        let mut partials: Vec<NodePartial> = Vec::new();
        let mut interrupt: Option<(NodeKind, InterruptRequest)> = None;
        for (_, kind, output) in run_result.outputs {
            match output {
                crate::node::NodeOutput::Update(partial) => {
                    update_nodes.push(kind);
                    partials.push(partial);
                }
                crate::node::NodeOutput::Interrupt(request) => {
                    if interrupt.is_none() {
                        interrupt = Some((kind, request));
                    } else {
                        tracing::warn!(
                            node = %kind,
                            step,
                            "second interrupt in one superstep; keeping the first"
                        );
                    }
                }
            }
        }

        // Barrier on a scratch copy so a reducer failure cannot leave the
        // session half-merged.
        let mut update_state = session.state.clone();
        let barrier_outcome = self
            .app
            .apply_barrier(&mut update_state, &update_nodes, partials)
            .await
            .map_err(RunnerError::AppBarrier)?;
        session.state = update_state;

        let post_snapshot = session.state.snapshot();
        let routed = self.compute_next_frontier(&post_snapshot, &update_nodes, step);

        let next_frontier = if let Some((entry_kind, request)) = interrupt {
            let mut path = vec![entry_kind.name().to_string()];
            path.extend(request.path);
            let issuing = path
                .last()
                .map(|name| NodeKind::from(name.as_str()))
                .unwrap_or_else(|| entry_kind.clone());
            let token = InterruptToken {
                id: request
                    .token_id
                    .unwrap_or_else(|| IdGenerator::new().generate_token_id()),
                node: issuing,
                path,
                kind: request.kind,
                payload: request.payload,
                raised_at: chrono::Utc::now(),
            };

            // The interrupted entry re-runs first on resume, keeping any
            // fan-out overlay it was scheduled with.
            let interrupted_entry = session
                .frontier
                .iter()
                .find(|entry| entry.kind == entry_kind)
                .cloned()
                .unwrap_or_else(|| FrontierEntry::node(entry_kind.clone()));
            let mut frontier = vec![interrupted_entry];
            for entry in routed {
                let duplicate = entry.overlay.is_none()
                    && frontier
                        .iter()
                        .any(|e| e.overlay.is_none() && e.kind == entry.kind);
                if !duplicate {
                    frontier.push(entry);
                }
            }

            session.status = SessionStatus::Interrupted;
            session.pending_interrupt = Some(token);
            frontier
        } else {
            session.pending_interrupt = None;
            routed
        };

        let completed = session.status == SessionStatus::Running
            && (next_frontier.is_empty() || next_frontier.iter().all(|e| e.kind.is_end()));
        if completed {
            session.status = SessionStatus::Completed;
        }
        session.frontier = next_frontier.clone();

        tracing::debug!(
            step,
            updated_channels = ?barrier_outcome.updated_channels,
            next_frontier_len = next_frontier.len(),
            status = session.status.as_str(),
            "superstep finished"
        );

        Ok(StepReport {
            step,
            ran_nodes: run_result.ran_nodes,
            skipped_nodes: run_result.skipped_nodes,
            barrier_outcome,
            next_frontier,
            state_versions: StateVersions::of(&session.state),
            completed,
        })
    }

    /// Resolve static edges plus conditional routes for the completed
    /// nodes into the next frontier. `To` targets are deduplicated by
    /// kind; `Send` directives are never deduplicated.
    fn compute_next_frontier(
        &self,
        snapshot: &StateSnapshot,
        ran: &[NodeKind],
        step: u64,
    ) -> Vec<FrontierEntry> {
        let mut next: Vec<FrontierEntry> = Vec::new();
        let graph_edges = self.app.edges();
        let conditional_edges = self.app.conditional_edges();

        for id in ran {
            let mut targets: Vec<RouteTarget> = graph_edges
                .get(id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(RouteTarget::To)
                .collect();

            for edge in conditional_edges.iter().filter(|ce| ce.from() == id) {
                tracing::debug!(from = %id, step, "evaluating conditional edge");
                targets.extend((edge.predicate())(snapshot.clone()));
            }

            for target in targets {
                match target {
                    RouteTarget::To(kind) => {
                        let valid = kind.is_end()
                            || kind.is_start()
                            || self.app.nodes().contains_key(&kind);
                        if !valid {
                            tracing::warn!(step, origin = %id, target = %kind, "route target not found; skipping");
                            continue;
                        }
                        if !next.iter().any(|e| e.overlay.is_none() && e.kind == kind) {
                            next.push(FrontierEntry::node(kind));
                        }
                    }
                    RouteTarget::Send(directive) => {
                        if self.app.nodes().contains_key(&directive.node) {
                            next.push(FrontierEntry::from_send(directive));
                        } else {
                            tracing::warn!(step, origin = %id, target = %directive.node, "send target not found; skipping");
                        }
                    }
                }
            }
        }

        next
    }

    /// Persist the current session state (used at session creation).
    async fn persist(&self, session_id: &str) -> Result<(), RunnerError> {
        if self.autosave
            && let Some(cp) = &self.checkpointer
            && let Some(session) = self.sessions.get(session_id)
        {
            cp.save(Checkpoint::from_session(session_id, session)).await?;
        }
        Ok(())
    }

    /// Persist a completed superstep with its report metadata.
    async fn persist_with_report(
        &self,
        session_id: &str,
        report: &StepReport,
    ) -> Result<(), RunnerError> {
        if self.autosave
            && let Some(cp) = &self.checkpointer
            && let Some(session) = self.sessions.get(session_id)
        {
            let checkpoint = Checkpoint::from_session(session_id, session).with_step_report(
                report.ran_nodes.clone(),
                report.skipped_nodes.clone(),
                report
                    .barrier_outcome
                    .updated_channels
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            );
            cp.save(checkpoint).await?;
        }
        Ok(())
    }

    /// Emit the stream-end diagnostic so consumers know this run's stream
    /// is complete. Root runner only; nested runners leave the parent's
    /// stream open. Subscriber channels end when the bus is dropped, so a
    /// long-lived runner can serve a fresh stream per resume.
    fn finalize(&self, session_id: &str, status: &str, step: Option<u64>) {
        if !self.is_root() {
            return;
        }
        let message = match step {
            Some(step) => format!("session={session_id} status={status} step={step}"),
            None => format!("session={session_id} status={status}"),
        };
        let _ = self
            .event_sender
            .send(Event::diagnostic(STREAM_END_SCOPE, message));
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
