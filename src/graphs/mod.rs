//! Workflow graph definition and compilation.
//!
//! [`GraphBuilder`] declares nodes, static edges, conditional routers, the
//! channel schema (accumulate lists), and optional input/output
//! projections, then compiles into an executable
//! [`App`](crate::app::App). Conditional routers return
//! [`RouteTarget`](crate::control::RouteTarget)s, which is also how
//! dynamic `Send` fan-out is expressed.

mod builder;
mod compilation;
mod edges;

pub use builder::GraphBuilder;
pub use compilation::GraphCompileError;
pub use edges::{ConditionalEdge, EdgePredicate};
