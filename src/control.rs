//! Control-flow primitives produced by routers.
//!
//! Routing decisions are kept separate from state updates: a node returns a
//! partial update, and the edges declared for that node decide what runs
//! next. A conditional edge may name nodes directly ([`RouteTarget::To`])
//! or fan out dynamically ([`RouteTarget::Send`]), producing one isolated
//! invocation of the target node per directive within the same superstep.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::types::NodeKind;

/// One parallel invocation requested by a router.
///
/// Directives from a single routing decision are unordered relative to each
/// other; the engine merges their results by channel policy, with output
/// order fixed by directive order rather than completion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendDirective {
    /// The node to invoke.
    pub node: NodeKind,
    /// Isolated input overlaid onto the invocation's extra snapshot. The
    /// accumulate channel is cleared for the invocation so each branch
    /// reports only its own additions.
    pub input: FxHashMap<String, Value>,
}

impl SendDirective {
    pub fn new(node: impl Into<NodeKind>, input: FxHashMap<String, Value>) -> Self {
        Self {
            node: node.into(),
            input,
        }
    }
}

/// A routing target returned by a conditional edge predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    /// Route to a node (or `End`) in the graph.
    To(NodeKind),
    /// Fan out one invocation of a node with isolated input.
    Send(SendDirective),
}

impl RouteTarget {
    /// Route to a named node.
    #[must_use]
    pub fn to(node: impl Into<NodeKind>) -> Self {
        RouteTarget::To(node.into())
    }

    /// Route to the virtual `End` node.
    #[must_use]
    pub fn end() -> Self {
        RouteTarget::To(NodeKind::End)
    }
}

impl From<NodeKind> for RouteTarget {
    fn from(kind: NodeKind) -> Self {
        RouteTarget::To(kind)
    }
}

impl From<SendDirective> for RouteTarget {
    fn from(directive: SendDirective) -> Self {
        RouteTarget::Send(directive)
    }
}

/// An entry in the execution frontier: a node plus the isolated input it
/// was scheduled with (present only for fan-out invocations).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontierEntry {
    pub kind: NodeKind,
    pub overlay: Option<FxHashMap<String, Value>>,
}

impl FrontierEntry {
    /// A plain frontier entry for `kind`.
    #[must_use]
    pub fn node(kind: NodeKind) -> Self {
        Self {
            kind,
            overlay: None,
        }
    }

    /// A frontier entry produced by a `Send` directive.
    #[must_use]
    pub fn from_send(directive: SendDirective) -> Self {
        Self {
            kind: directive.node,
            overlay: Some(directive.input),
        }
    }

    /// Whether this entry is a fan-out invocation.
    #[must_use]
    pub fn is_send(&self) -> bool {
        self.overlay.is_some()
    }
}

impl From<NodeKind> for FrontierEntry {
    fn from(kind: NodeKind) -> Self {
        FrontierEntry::node(kind)
    }
}
