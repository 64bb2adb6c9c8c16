//! Compiled workflow and barrier application.
//!
//! An [`App`] is the immutable, executable form of a graph: nodes, edges,
//! conditional routers, the channel schema, and optional input/output
//! projections for embedding. Execution state lives in
//! [`AppRunner`](crate::runtimes::AppRunner); one `App` can back any
//! number of concurrent runners.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::channels::Channel;
use crate::channels::errors::{ErrorEvent, ErrorScope};
use crate::event_bus::{ChannelSink, Event, EventStream};
use crate::graphs::ConditionalEdge;
use crate::message::Message;
use crate::node::{Node, NodePartial};
use crate::reducers::ReducerRegistry;
use crate::runtimes::runner::{AppRunner, RunOutcome, RunnerError};
use crate::runtimes::{CheckpointerType, RuntimeConfig, SessionInit};
use crate::state::{Projection, VersionedState};
use crate::types::NodeKind;
use crate::utils::collections::{new_accum_map, new_extra_map};
use crate::utils::id_generator::IdGenerator;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Orchestrates graph execution and applies reducers at barriers.
///
/// # Examples
///
/// ```rust,no_run
/// use dialogweave::graphs::GraphBuilder;
/// use dialogweave::state::VersionedState;
/// use dialogweave::types::NodeKind;
///
/// # struct EchoNode;
/// # #[async_trait::async_trait]
/// # impl dialogweave::node::Node for EchoNode {
/// #     async fn run(
/// #         &self,
/// #         _: dialogweave::state::StateSnapshot,
/// #         _: dialogweave::node::NodeContext,
/// #     ) -> Result<dialogweave::node::NodeOutput, dialogweave::node::NodeError> {
/// #         Ok(dialogweave::node::NodePartial::default().into())
/// #     }
/// # }
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("echo".into()), EchoNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("echo".into()))
///     .add_edge(NodeKind::Custom("echo".into()), NodeKind::End)
///     .compile()?;
///
/// let outcome = app.invoke(VersionedState::new_with_user_message("Hello")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<ConditionalEdge>,
    accumulators: Arc<Vec<String>>,
    input_projection: Option<Projection>,
    output_projection: Option<Projection>,
    reducer_registry: ReducerRegistry,
    runtime_config: RuntimeConfig,
}

/// Result of applying node partials at a barrier.
///
/// Aggregates channel updates and errors in a deterministic order so the
/// runner, checkpointers, and tests observe stable behaviour.
#[derive(Debug, Clone, Default)]
pub struct BarrierOutcome {
    /// Channel identifiers that were updated during the barrier.
    pub updated_channels: Vec<&'static str>,
    /// Aggregated error events emitted by nodes in the superstep.
    pub errors: Vec<ErrorEvent>,
}

/// Handle for a streaming workflow invocation. Dropping it aborts the
/// workflow task; use [`join`](InvocationHandle::join) for graceful
/// completion.
pub struct InvocationHandle {
    join_handle: Option<JoinHandle<Result<RunOutcome, RunnerError>>>,
}

impl InvocationHandle {
    /// Abort the underlying workflow task.
    pub fn abort(&self) {
        if let Some(handle) = &self.join_handle {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// Await the workflow outcome.
    pub async fn join(mut self) -> Result<RunOutcome, RunnerError> {
        let handle = self
            .join_handle
            .take()
            .expect("join_handle already awaited");
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(RunnerError::Join(err)),
        }
    }
}

impl App {
    /// Internal (crate) factory keeping nodes/edges private.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: FxHashMap<NodeKind, Vec<NodeKind>>,
        conditional_edges: Vec<ConditionalEdge>,
        accumulators: Vec<String>,
        input_projection: Option<Projection>,
        output_projection: Option<Projection>,
        runtime_config: RuntimeConfig,
    ) -> Self {
        let accumulators = Arc::new(accumulators);
        App {
            nodes,
            edges,
            conditional_edges,
            reducer_registry: ReducerRegistry::for_schema(Arc::clone(&accumulators)),
            accumulators,
            input_projection,
            output_projection,
            runtime_config,
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeKind, Vec<NodeKind>> {
        &self.edges
    }

    #[must_use]
    pub fn conditional_edges(&self) -> &Vec<ConditionalEdge> {
        &self.conditional_edges
    }

    /// Declared append-accumulate lists (the channel schema).
    #[must_use]
    pub fn accumulators(&self) -> &[String] {
        &self.accumulators
    }

    /// The narrow input contract used when embedded as a sub-workflow.
    #[must_use]
    pub fn input_projection(&self) -> Option<&Projection> {
        self.input_projection.as_ref()
    }

    /// The narrow output contract used when embedded as a sub-workflow.
    #[must_use]
    pub fn output_projection(&self) -> Option<&Projection> {
        self.output_projection.as_ref()
    }

    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    fn resolve_checkpointer(&self) -> CheckpointerType {
        self.runtime_config
            .checkpointer
            .clone()
            .unwrap_or(CheckpointerType::InMemory)
    }

    /// Session id for the next invocation: the configured id, or a fresh
    /// random one.
    fn next_session_id(&self) -> String {
        self.runtime_config
            .session_id
            .clone()
            .unwrap_or_else(|| IdGenerator::new().generate_run_id())
    }

    async fn run_session(
        mut runner: AppRunner,
        session_id: String,
        initial_state: VersionedState,
    ) -> Result<RunOutcome, RunnerError> {
        let init = runner
            .create_session(session_id.clone(), initial_state)
            .await?;
        if let SessionInit::Resumed { checkpoint_step } = init {
            tracing::info!(
                session = %session_id,
                checkpoint_step,
                "resuming session from checkpoint"
            );
        }
        runner.run_until_settled(&session_id).await
    }

    /// Execute the workflow to a settled state (completed or interrupted)
    /// with the runtime-configured event bus.
    ///
    /// For interrupt/resume round-trips keep an [`AppRunner`] instead, so
    /// the in-memory checkpointer and sessions survive between calls.
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke(
        &self,
        initial_state: VersionedState,
    ) -> Result<RunOutcome, RunnerError> {
        let bus = self.runtime_config.event_bus.build_event_bus();
        let runner = AppRunner::with_options_and_bus(
            self.clone(),
            self.resolve_checkpointer(),
            true,
            bus,
            true,
        )
        .await;
        Self::run_session(runner, self.next_session_id(), initial_state).await
    }

    /// Execute the workflow while streaming events to a channel.
    ///
    /// Returns the settled outcome together with the receiver carrying
    /// every event emitted during execution.
    #[instrument(skip(self, initial_state))]
    pub async fn invoke_with_channel(
        &self,
        initial_state: VersionedState,
    ) -> (
        Result<RunOutcome, RunnerError>,
        tokio::sync::mpsc::UnboundedReceiver<Event>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bus = self.runtime_config.event_bus.build_event_bus();
        bus.add_sink(ChannelSink::new(tx));
        let runner = AppRunner::with_options_and_bus(
            self.clone(),
            self.resolve_checkpointer(),
            true,
            bus,
            true,
        )
        .await;
        let result = Self::run_session(runner, self.next_session_id(), initial_state).await;
        (result, rx)
    }

    /// Execute asynchronously, returning a join handle plus an ordered
    /// event stream. Dropping the handle aborts the run; dropping the
    /// stream only detaches the consumer.
    pub async fn invoke_streaming(
        &self,
        initial_state: VersionedState,
    ) -> (InvocationHandle, EventStream) {
        let bus = self.runtime_config.event_bus.build_event_bus();
        let stream = bus.subscribe();
        let runner = AppRunner::with_options_and_bus(
            self.clone(),
            self.resolve_checkpointer(),
            true,
            bus,
            true,
        )
        .await;
        let session_id = self.next_session_id();
        let join = tokio::spawn(Self::run_session(runner, session_id, initial_state));
        (
            InvocationHandle {
                join_handle: Some(join),
            },
            stream,
        )
    }

    /// Merge node outputs and apply reducers after a superstep.
    ///
    /// Partials must arrive in frontier order; the barrier merges them
    /// deterministically (extra keys sorted within each partial, errors
    /// sorted by scope and time) and bumps each channel's version only
    /// when its content changed.
    #[instrument(skip(self, state, run_ids, node_partials), err)]
    pub async fn apply_barrier(
        &self,
        state: &mut VersionedState,
        run_ids: &[NodeKind],
        node_partials: Vec<NodePartial>,
    ) -> Result<BarrierOutcome, Box<dyn std::error::Error + Send + Sync>> {
        let mut msgs_all: Vec<Message> = Vec::new();
        let mut extra_all = new_extra_map();
        let mut accum_all = new_accum_map();
        let mut errors_all: Vec<ErrorEvent> = Vec::new();

        for (i, partial) in node_partials.iter().enumerate() {
            let fallback = NodeKind::Custom("?".to_string());
            let nid = run_ids.get(i).unwrap_or(&fallback);

            if let Some(ms) = &partial.messages
                && !ms.is_empty()
            {
                tracing::debug!(node = %nid, count = ms.len(), "node produced messages");
                msgs_all.extend(ms.iter().cloned());
            }

            if let Some(ex) = &partial.extra
                && !ex.is_empty()
            {
                tracing::debug!(node = %nid, keys = ex.len(), "node produced extra data");
                // Sort keys to keep the merged map deterministic across runs.
                let mut sorted_pairs: Vec<_> = ex.iter().collect();
                sorted_pairs.sort_by(|(left, _), (right, _)| left.cmp(right));
                for (k, v) in sorted_pairs {
                    extra_all.insert(k.clone(), v.clone());
                }
            }

            if let Some(lists) = &partial.accum
                && !lists.is_empty()
            {
                tracing::debug!(node = %nid, lists = lists.len(), "node produced accumulate entries");
                let mut sorted_lists: Vec<_> = lists.iter().collect();
                sorted_lists.sort_by(|(left, _), (right, _)| left.cmp(right));
                for (name, values) in sorted_lists {
                    accum_all
                        .entry(name.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
            }

            if let Some(errs) = &partial.errors
                && !errs.is_empty()
            {
                tracing::debug!(node = %nid, count = errs.len(), "node produced errors");
                errors_all.extend(errs.iter().cloned());
            }
        }

        fn scope_sort_key(scope: &ErrorScope) -> (u8, &str, u64) {
            match scope {
                ErrorScope::Node { kind, step } => (0, kind.as_str(), *step),
                ErrorScope::Scheduler { step } => (1, "", *step),
                ErrorScope::Runner { session, step } => (2, session.as_str(), *step),
                ErrorScope::App => (3, "", 0),
            }
        }

        errors_all.sort_by(|a, b| {
            let key_a = scope_sort_key(&a.scope);
            let key_b = scope_sort_key(&b.scope);
            key_a
                .cmp(&key_b)
                .then_with(|| a.when.cmp(&b.when))
                .then_with(|| a.error.message.cmp(&b.error.message))
        });

        let merged_updates = NodePartial {
            messages: (!msgs_all.is_empty()).then_some(msgs_all),
            extra: (!extra_all.is_empty()).then_some(extra_all),
            accum: (!accum_all.is_empty()).then_some(accum_all),
            errors: (!errors_all.is_empty()).then(|| errors_all.clone()),
        };

        // Record before-states for version bump decisions.
        let msgs_before_len = state.messages.len();
        let msgs_before_ver = state.messages.version();
        let extra_before = state.extra.snapshot();
        let extra_before_ver = state.extra.version();
        let accum_before = state.accum.snapshot();
        let accum_before_ver = state.accum.version();
        let errors_before_len = state.errors.len();
        let errors_before_ver = state.errors.version();

        // Reducers do not bump versions themselves.
        self.reducer_registry
            .apply_all(&mut *state, &merged_updates)?;

        let mut updated: Vec<&'static str> = Vec::new();

        if state.messages.len() != msgs_before_len {
            state
                .messages
                .set_version(msgs_before_ver.saturating_add(1));
            updated.push("messages");
        }
        if state.extra.snapshot() != extra_before {
            state.extra.set_version(extra_before_ver.saturating_add(1));
            updated.push("extra");
        }
        if state.accum.snapshot() != accum_before {
            state.accum.set_version(accum_before_ver.saturating_add(1));
            updated.push("accum");
        }
        if state.errors.len() != errors_before_len {
            state
                .errors
                .set_version(errors_before_ver.saturating_add(1));
            updated.push("errors");
        }
        if !updated.is_empty() {
            tracing::debug!(channels = ?updated, "barrier updated channels");
        }

        Ok(BarrierOutcome {
            updated_channels: updated,
            errors: errors_all,
        })
    }

    /// Helper for reading a projected value out of final state, mostly for
    /// examples and tests.
    #[must_use]
    pub fn extra_value<'a>(state: &'a VersionedState, key: &str) -> Option<&'a Value> {
        state.extra.get().get(key)
    }
}
