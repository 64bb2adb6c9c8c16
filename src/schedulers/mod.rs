//! Concurrent superstep execution.
//!
//! The scheduler runs every entry of the current frontier concurrently,
//! bounded by the session's concurrency limit, and returns outputs tagged
//! with their frontier index so the barrier merges them in declared order
//! — never in completion order. Virtual `Start`/`End` entries are skipped.
//!
//! Fan-out entries carry an input overlay: the invocation sees the shared
//! snapshot with the overlay applied to `extra` and the accumulate channel
//! cleared, so each branch reports only its own additions.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::control::FrontierEntry;
use crate::event_bus::Event;
use crate::interrupts::ResumeEnvelope;
use crate::node::{Node, NodeContext, NodeError, NodeOutput};
use crate::runtimes::Checkpointer;
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Per-invocation context shared by one superstep.
#[derive(Clone)]
pub struct ContextSeed {
    pub session_id: String,
    pub path: Vec<String>,
    pub event_sender: flume::Sender<Event>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    pub concurrency_limit: usize,
    /// The resume envelope plus the node it must be injected into, present
    /// only on the first superstep after a resume.
    pub resume: Option<(NodeKind, Arc<ResumeEnvelope>)>,
}

/// Outcome of one superstep.
#[derive(Debug)]
pub struct StepRunResult {
    pub ran_nodes: Vec<NodeKind>,
    pub skipped_nodes: Vec<NodeKind>,
    /// `(frontier_index, kind, output)` sorted by frontier index.
    pub outputs: Vec<(usize, NodeKind, NodeOutput)>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("node {kind} failed at step {step}: {source}")]
    #[diagnostic(code(dialogweave::scheduler::node_run))]
    NodeRun {
        kind: NodeKind,
        step: u64,
        #[source]
        source: NodeError,
    },

    #[error("node task join error: {0}")]
    #[diagnostic(code(dialogweave::scheduler::join))]
    Join(#[from] JoinError),
}

/// Bounded-concurrency superstep executor.
#[derive(Clone, Debug)]
pub struct Scheduler {
    pub concurrency_limit: usize,
}

impl Scheduler {
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Build the snapshot one frontier entry observes.
    fn entry_snapshot(base: &StateSnapshot, entry: &FrontierEntry) -> StateSnapshot {
        let mut snapshot = base.clone();
        if let Some(overlay) = &entry.overlay {
            for (k, v) in overlay {
                snapshot.extra.insert(k.clone(), v.clone());
            }
            snapshot.accum = FxHashMap::default();
        }
        snapshot
    }

    /// Run one superstep over the frontier.
    ///
    /// All runnable entries are spawned concurrently; the call returns
    /// once every invocation has completed. A node error fails the whole
    /// step (remaining invocations are still awaited so their side
    /// effects finish before the error surfaces).
    pub async fn superstep(
        &self,
        nodes: &FxHashMap<NodeKind, Arc<dyn Node>>,
        frontier: &[FrontierEntry],
        snapshot: StateSnapshot,
        step: u64,
        seed: ContextSeed,
    ) -> Result<StepRunResult, SchedulerError> {
        let mut ran_nodes: Vec<NodeKind> = Vec::new();
        let mut skipped_nodes: Vec<NodeKind> = Vec::new();
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));
        let mut join_set: JoinSet<(usize, NodeKind, Result<NodeOutput, NodeError>)> =
            JoinSet::new();
        let mut resume = seed.resume.clone();

        for (index, entry) in frontier.iter().enumerate() {
            if entry.kind.is_start() || entry.kind.is_end() {
                skipped_nodes.push(entry.kind.clone());
                continue;
            }
            let Some(node) = nodes.get(&entry.kind) else {
                tracing::warn!(node = %entry.kind, step, "frontier entry has no registered node; skipping");
                skipped_nodes.push(entry.kind.clone());
                continue;
            };

            let resume_envelope = match &resume {
                Some((target, _)) if *target == entry.kind => {
                    resume.take().map(|(_, envelope)| envelope)
                }
                _ => None,
            };

            let ctx = NodeContext {
                node_id: entry.kind.name().to_string(),
                step,
                session_id: seed.session_id.clone(),
                path: seed.path.clone(),
                event_bus_sender: seed.event_sender.clone(),
                checkpointer: seed.checkpointer.clone(),
                concurrency_limit: seed.concurrency_limit,
                resume: resume_envelope,
            };

            let _ = seed.event_sender.send(Event::node_active(
                entry.kind.name(),
                step,
                seed.path.clone(),
            ));

            ran_nodes.push(entry.kind.clone());

            let node = Arc::clone(node);
            let kind = entry.kind.clone();
            let entry_snapshot = Self::entry_snapshot(&snapshot, entry);
            let semaphore = Arc::clone(&semaphore);
            let completion_sender = seed.event_sender.clone();
            let completion_path = seed.path.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("superstep semaphore closed");
                let result = node.run(entry_snapshot, ctx).await;
                if result.is_ok() {
                    let _ = completion_sender.send(Event::node_completed(
                        kind.name(),
                        step,
                        completion_path,
                    ));
                }
                (index, kind, result)
            });
        }

        let mut outputs: Vec<(usize, NodeKind, NodeOutput)> = Vec::new();
        let mut first_error: Option<(usize, SchedulerError)> = None;
        while let Some(joined) = join_set.join_next().await {
            let (index, kind, result) = joined?;
            match result {
                Ok(output) => outputs.push((index, kind, output)),
                Err(source) => {
                    // Keep draining so in-flight invocations finish; report
                    // the failure with the lowest frontier index.
                    let error = SchedulerError::NodeRun { kind, step, source };
                    match &first_error {
                        Some((existing, _)) if *existing <= index => {}
                        _ => first_error = Some((index, error)),
                    }
                }
            }
        }

        if let Some((_, error)) = first_error {
            return Err(error);
        }

        outputs.sort_by_key(|(index, _, _)| *index);
        Ok(StepRunResult {
            ran_nodes,
            skipped_nodes,
            outputs,
        })
    }
}
