//! Fluent builder for workflow graphs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::edges::{ConditionalEdge, EdgePredicate};
use crate::node::Node;
use crate::runtimes::RuntimeConfig;
use crate::state::Projection;
use crate::types::NodeKind;

/// Builder for workflow graphs.
///
/// A graph needs at least one executable node, an edge out of the virtual
/// `Start`, and a path to `End` (static or via conditional routing).
/// `Start`/`End` are never registered as nodes — they anchor topology
/// only.
///
/// # Examples
///
/// ```
/// use dialogweave::graphs::GraphBuilder;
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
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("echo".into()), EchoNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("echo".into()))
///     .add_edge(NodeKind::Custom("echo".into()), NodeKind::End)
///     .compile()
///     .expect("valid graph");
/// ```
pub struct GraphBuilder {
    pub(crate) nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    pub(crate) edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    pub(crate) conditional_edges: Vec<ConditionalEdge>,
    pub(crate) accumulators: Vec<String>,
    pub(crate) input_projection: Option<Projection>,
    pub(crate) output_projection: Option<Projection>,
    pub(crate) runtime_config: RuntimeConfig,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            conditional_edges: Vec::new(),
            accumulators: Vec::new(),
            input_projection: None,
            output_projection: None,
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Register an executable node.
    ///
    /// Attempts to register the virtual `Start`/`End` kinds are ignored
    /// with a warning.
    #[must_use]
    pub fn add_node(mut self, id: NodeKind, node: impl Node + 'static) -> Self {
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(?id, "ignoring registration of virtual node kind");
            }
            _ => {
                self.nodes.insert(id, Arc::new(node));
            }
        }
        self
    }

    /// Register an already-shared node (used for sub-workflow adapters).
    #[must_use]
    pub fn add_shared_node(mut self, id: NodeKind, node: Arc<dyn Node>) -> Self {
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(?id, "ignoring registration of virtual node kind");
            }
            _ => {
                self.nodes.insert(id, node);
            }
        }
        self
    }

    /// Add an unconditional edge. Multiple edges from one node fan out;
    /// multiple edges into one node fan in.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    /// Add a conditional edge routing dynamically from `from` based on the
    /// post-barrier snapshot.
    #[must_use]
    pub fn add_conditional_edge(mut self, from: impl Into<NodeKind>, predicate: EdgePredicate) -> Self {
        self.conditional_edges
            .push(ConditionalEdge::new(from, predicate));
        self
    }

    /// Declare an append-accumulate list in the channel schema. The schema
    /// is immutable after compile.
    #[must_use]
    pub fn add_accumulator(mut self, name: &str) -> Self {
        if !self.accumulators.iter().any(|n| n == name) {
            self.accumulators.push(name.to_string());
        }
        self
    }

    /// Declare the narrow input contract used when this workflow is
    /// embedded as a sub-workflow.
    #[must_use]
    pub fn with_input_projection(mut self, projection: Projection) -> Self {
        self.input_projection = Some(projection);
        self
    }

    /// Declare the narrow output contract used when this workflow is
    /// embedded as a sub-workflow.
    #[must_use]
    pub fn with_output_projection(mut self, projection: Projection) -> Self {
        self.output_projection = Some(projection);
        self
    }

    /// Configure runtime settings for the compiled application.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    /// Registered node kinds, in arbitrary order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeKind> {
        self.nodes.keys()
    }

    /// Static edges as `(from, to)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeKind, &NodeKind)> {
        self.edges
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (from, to)))
    }
}
