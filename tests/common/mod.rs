#![allow(dead_code)]

pub mod collaborators;
pub mod nodes;

use dialogweave::app::App;
use dialogweave::event_bus::{Event, EventBus};
use dialogweave::runtimes::{AppRunner, CheckpointerType};

/// Runner with a quiet event bus (no stdout sink) for event-counting
/// tests.
pub async fn quiet_runner(app: App) -> AppRunner {
    let bus = EventBus::with_sinks(vec![]);
    AppRunner::with_options_and_bus(app, CheckpointerType::InMemory, true, bus, true).await
}

/// Count events in a drained stream by wire type tag.
pub fn count_events(events: &[Event], tag: &str) -> usize {
    events.iter().filter(|e| e.type_tag() == tag).count()
}
