//! Sub-workflow composition: a compiled workflow embedded as a single node.
//!
//! The adapter owns nothing the parent graph needs to know about: the
//! child's internals stay hidden behind its declared input/output
//! projections. Parent and child share one checkpointer and one RunId
//! lineage (the child runs under `parent/node[/namespace]`), so a single
//! persisted history covers both, and the child's node events flow into
//! the parent's stream tagged with the adapter's path.
//!
//! Interrupts propagate transparently: a child interrupt settles the child
//! runner, and the adapter re-raises the child's token with its own name
//! prefixed to the path. Resuming the parent hands the value back to this
//! adapter, which resumes the child run — the value lands in the
//! still-pending child node, never in the adapter itself.

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::App;
use crate::interrupts::InterruptRequest;
use crate::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
use crate::runtimes::runner::{AppRunner, RunOutcome};
use crate::state::{Projection, StateSnapshot, VersionedState};

/// A compiled workflow acting as one node of a parent workflow.
pub struct SubWorkflowNode {
    name: String,
    app: Arc<App>,
    /// Extra key whose value namespaces the child session id, so repeated
    /// invocations within one conversation get distinct child runs while
    /// an interrupted invocation keeps resuming the same one.
    namespace_key: Option<String>,
}

impl SubWorkflowNode {
    pub fn new(name: impl Into<String>, app: Arc<App>) -> Self {
        Self {
            name: name.into(),
            app,
            namespace_key: None,
        }
    }

    /// Namespace child sessions by the value of this extra key.
    #[must_use]
    pub fn with_namespace_key(mut self, key: &str) -> Self {
        self.namespace_key = Some(key.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn child_session_id(&self, parent_session: &str, snapshot: &StateSnapshot) -> String {
        let mut id = format!("{parent_session}/{}", self.name);
        if let Some(key) = &self.namespace_key
            && let Some(ns) = snapshot.extra_str(key)
            && !ns.is_empty()
        {
            id.push('/');
            id.push_str(ns);
        }
        id
    }

    fn child_input(&self, snapshot: &StateSnapshot) -> VersionedState {
        match self.app.input_projection() {
            Some(projection) => projection.project_state(snapshot),
            None => VersionedState::builder().build(),
        }
    }

    fn child_output(&self, state: &VersionedState) -> NodePartial {
        match self.app.output_projection() {
            Some(projection) => projection.project_partial(state),
            // Without a declared contract nothing crosses back upward.
            None => Projection::default().project_partial(state),
        }
    }
}

#[async_trait]
impl Node for SubWorkflowNode {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        // The shared checkpointer is what lets an interrupted child run be
        // resumed by a later invocation of this adapter.
        let checkpointer = ctx
            .checkpointer
            .clone()
            .ok_or(NodeError::MissingInput {
                what: "checkpointer (sub-workflows require persistence)",
            })?;
        let child_session = self.child_session_id(&ctx.session_id, &snapshot);
        let mut child_path = ctx.path.clone();
        child_path.push(self.name.clone());

        let mut runner = AppRunner::for_subworkflow(
            Arc::clone(&self.app),
            Some(checkpointer),
            ctx.event_bus_sender.clone(),
            child_path,
            ctx.concurrency_limit,
        );

        let map_err = |e: crate::runtimes::RunnerError| NodeError::Subworkflow {
            name: self.name.clone(),
            message: e.to_string(),
        };

        runner
            .create_session(child_session.clone(), self.child_input(&snapshot))
            .await
            .map_err(map_err)?;

        let outcome = match ctx.resume.as_ref() {
            Some(envelope) => runner
                .resume(&child_session, envelope.value.clone())
                .await
                .map_err(map_err)?,
            None => runner
                .run_until_settled(&child_session)
                .await
                .map_err(map_err)?,
        };

        match outcome {
            RunOutcome::Interrupted(token) => {
                ctx.emit("subworkflow", format!("{} suspended for input", self.name))?;
                Ok(NodeOutput::Interrupt(InterruptRequest::propagated(token)))
            }
            RunOutcome::Completed(final_state) => {
                ctx.emit("subworkflow", format!("{} completed", self.name))?;
                Ok(NodeOutput::Update(self.child_output(&final_state)))
            }
        }
    }
}
