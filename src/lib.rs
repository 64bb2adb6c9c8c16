//! # Dialogweave: Resumable Conversational Agent Workflows
//!
//! Dialogweave executes directed workflows of computation steps ("nodes")
//! that call a language model, run tools, inject retrieved context — and,
//! critically, can pause mid-execution to ask a human for input, resume
//! later with that input, and embed a nested workflow that itself pauses
//! and fans out into parallel sub-tasks.
//!
//! ## Core Concepts
//!
//! - **Nodes**: async units of work over immutable state snapshots that
//!   return partial updates or interrupt requests
//! - **Channels**: versioned state slots with declared merge policies
//!   (append messages, replace extras, append-accumulate lists)
//! - **Graph**: declarative workflow definition with conditional routing
//!   and dynamic `Send` fan-out
//! - **Interrupts**: durable human-in-the-loop suspension points that
//!   survive arbitrary pauses and process restarts
//! - **Sub-workflows**: compiled graphs embedded as single nodes, sharing
//!   checkpoint lineage and propagating interrupts transparently
//! - **Events**: an ordered, typed stream of run/node/message/interrupt
//!   transitions for remote consumers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialogweave::graphs::GraphBuilder;
//! use dialogweave::message::Message;
//! use dialogweave::node::{Node, NodeContext, NodeError, NodeOutput, NodePartial};
//! use dialogweave::runtimes::{AppRunner, CheckpointerType, RunOutcome};
//! use dialogweave::state::{StateSnapshot, VersionedState};
//! use dialogweave::types::NodeKind;
//! use async_trait::async_trait;
//!
//! struct GreetingNode;
//!
//! #[async_trait]
//! impl Node for GreetingNode {
//!     async fn run(
//!         &self,
//!         _snapshot: StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodeOutput, NodeError> {
//!         Ok(NodePartial::new()
//!             .with_messages(vec![Message::assistant("Hello! How can I help?")])
//!             .into())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("greet".into()), GreetingNode)
//!     .add_edge(NodeKind::Start, NodeKind::Custom("greet".into()))
//!     .add_edge(NodeKind::Custom("greet".into()), NodeKind::End)
//!     .compile()?;
//!
//! let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
//! runner
//!     .create_session("thread-1".into(), VersionedState::new_with_user_message("Hi"))
//!     .await?;
//! match runner.run_until_settled("thread-1").await? {
//!     RunOutcome::Completed(state) => println!("{} messages", state.messages.len()),
//!     RunOutcome::Interrupted(token) => println!("awaiting input: {}", token.kind.as_str()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`message`] — conversation messages and tool calls
//! - [`state`] — versioned channel state, snapshots, projections
//! - [`node`] — the `Node` trait, partial updates, interrupt outputs
//! - [`graphs`] — workflow definition and compilation
//! - [`control`] — routing targets, `Send` directives, frontier entries
//! - [`interrupts`] — durable suspension tokens and resume validation
//! - [`schedulers`] — bounded-concurrency superstep execution
//! - [`runtimes`] — the runner, sessions, and checkpointing
//! - [`subgraph`] — workflows embedded as nodes
//! - [`event_bus`] — the ordered typed event stream
//! - [`collaborators`] — model / retriever / web-search interfaces
//! - [`tools`] — executable tools and routing sentinels
//! - [`agent`] — the deep-research conversational agent built on all of
//!   the above

pub mod agent;
pub mod app;
pub mod channels;
pub mod collaborators;
pub mod control;
pub mod event_bus;
pub mod graphs;
pub mod interrupts;
pub mod message;
pub mod node;
pub mod reducers;
pub mod runtimes;
pub mod schedulers;
pub mod state;
pub mod subgraph;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod utils;
