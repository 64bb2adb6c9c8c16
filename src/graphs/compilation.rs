//! Graph compilation and structural validation.

use miette::Diagnostic;
use thiserror::Error;

use crate::app::App;
use crate::types::NodeKind;

/// Build-time graph definition errors.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    /// An edge references a node that was never registered.
    #[error("edge {from} -> {to} references undeclared node {to}")]
    #[diagnostic(
        code(dialogweave::graphs::unknown_node),
        help("Register the node with add_node before wiring edges to it.")
    )]
    UnknownNode { from: String, to: String },

    /// A conditional edge hangs off a node that was never registered.
    #[error("conditional edge from undeclared node {from}")]
    #[diagnostic(code(dialogweave::graphs::unknown_conditional_source))]
    UnknownConditionalSource { from: String },

    /// No edge leaves the virtual `Start` node.
    #[error("no entry point: add at least one edge from Start")]
    #[diagnostic(
        code(dialogweave::graphs::no_entry_point),
        help("Every graph needs an edge from NodeKind::Start to its first node.")
    )]
    NoEntryPoint,

    /// The graph contains no executable nodes.
    #[error("graph has no executable nodes")]
    #[diagnostic(code(dialogweave::graphs::empty_graph))]
    EmptyGraph,
}

impl super::builder::GraphBuilder {
    /// Validate the graph and compile it into an executable [`App`].
    ///
    /// Fatal problems (unknown edge targets, missing entry point, empty
    /// graph) fail compilation. A node that is not statically reachable
    /// from `Start` only produces a warning, since conditional routers and
    /// `Send` directives can reach it at runtime. Cycles are allowed; the
    /// runner's step ceiling is the backstop against unbounded loops.
    pub fn compile(self) -> Result<App, GraphCompileError> {
        if self.nodes.is_empty() {
            return Err(GraphCompileError::EmptyGraph);
        }

        let declared = |kind: &NodeKind| match kind {
            NodeKind::Start | NodeKind::End => true,
            custom => self.nodes.contains_key(custom),
        };

        for (from, targets) in &self.edges {
            if !declared(from) {
                return Err(GraphCompileError::UnknownNode {
                    from: "?".to_string(),
                    to: from.name().to_string(),
                });
            }
            for to in targets {
                if !declared(to) {
                    return Err(GraphCompileError::UnknownNode {
                        from: from.name().to_string(),
                        to: to.name().to_string(),
                    });
                }
            }
        }

        for edge in &self.conditional_edges {
            if !declared(edge.from()) {
                return Err(GraphCompileError::UnknownConditionalSource {
                    from: edge.from().name().to_string(),
                });
            }
        }

        // The entry frontier is seeded from the static Start edges, so a
        // conditional edge alone cannot open the graph.
        let has_entry = self
            .edges
            .get(&NodeKind::Start)
            .map(|targets| !targets.is_empty())
            .unwrap_or(false);
        if !has_entry {
            return Err(GraphCompileError::NoEntryPoint);
        }

        // Static reachability sweep; conditional targets are opaque, so
        // unreached nodes are only worth a warning.
        let mut visited: Vec<NodeKind> = vec![NodeKind::Start];
        let mut queue: Vec<NodeKind> = vec![NodeKind::Start];
        while let Some(current) = queue.pop() {
            for target in self.edges.get(&current).into_iter().flatten() {
                if !visited.contains(target) {
                    visited.push(target.clone());
                    queue.push(target.clone());
                }
            }
        }
        let has_conditionals = !self.conditional_edges.is_empty();
        for kind in self.nodes.keys() {
            if !visited.contains(kind) && !has_conditionals {
                tracing::warn!(node = %kind, "node is not reachable from Start");
            }
        }

        Ok(App::from_parts(
            self.nodes,
            self.edges,
            self.conditional_edges,
            self.accumulators,
            self.input_projection,
            self.output_projection,
            self.runtime_config,
        ))
    }
}
