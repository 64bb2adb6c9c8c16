//! Edge types and routing predicates.

use std::sync::Arc;

use crate::control::RouteTarget;
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Predicate for conditional routing.
///
/// Evaluated after the `from` node completes, with the post-barrier
/// snapshot. Returns the targets to schedule next: direct node routes,
/// `End`, or a batch of `Send` directives for dynamic fan-out. A router
/// that can produce zero directives must return its fall-through target
/// explicitly so the step advances as a no-op.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dialogweave::control::RouteTarget;
/// use dialogweave::graphs::EdgePredicate;
///
/// // Route based on whether the last assistant turn requested tools.
/// let route: EdgePredicate = Arc::new(|snapshot| {
///     let wants_tools = snapshot
///         .last_message()
///         .map(|m| !m.tool_calls.is_empty())
///         .unwrap_or(false);
///     if wants_tools {
///         vec![RouteTarget::to("tools")]
///     } else {
///         vec![RouteTarget::end()]
///     }
/// });
/// ```
pub type EdgePredicate = Arc<dyn Fn(StateSnapshot) -> Vec<RouteTarget> + Send + Sync + 'static>;

/// A conditional edge: a source node plus its routing predicate.
#[derive(Clone)]
pub struct ConditionalEdge {
    from: NodeKind,
    predicate: EdgePredicate,
}

impl ConditionalEdge {
    pub fn new(from: impl Into<NodeKind>, predicate: EdgePredicate) -> Self {
        Self {
            from: from.into(),
            predicate,
        }
    }

    pub fn from(&self) -> &NodeKind {
        &self.from
    }

    pub fn predicate(&self) -> &EdgePredicate {
        &self.predicate
    }
}
