//! Typed event stream: bus, sinks, and subscriber APIs.
//!
//! The engine converts step transitions into an ordered sequence of
//! [`Event`]s. An [`EventBus`] fans them out to [`EventSink`]s (stdout,
//! memory, channels) and to subscriber [`EventStream`]s; a consumer
//! disconnecting never affects the run itself.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::{EventBus, EventStream};
pub use event::{
    DiagnosticEvent, Event, InterruptEvent, MessageStreamEvent, NodeEvent, NodeEventKind,
    RunEvent, RunStatusEvent, STREAM_END_SCOPE,
};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
