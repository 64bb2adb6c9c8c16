use crate::event_bus::{EventBus, MemorySink, StdOutSink};
use crate::utils::id_generator::IdGenerator;

use super::CheckpointerType;

/// Default superstep ceiling: generous for agent/tool loops, finite enough
/// to convert runaway cycles into an error instead of a hang.
pub const DEFAULT_STEP_LIMIT: u64 = 64;

/// Runtime knobs for a compiled workflow.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Fixed session id for invocations; a random one is generated when
    /// absent.
    pub session_id: Option<String>,
    /// Persistence backend for checkpoints.
    pub checkpointer: Option<CheckpointerType>,
    /// SQLite database file used when the `sqlite` backend is selected.
    pub sqlite_db_name: Option<String>,
    /// Superstep ceiling per run.
    pub step_limit: u64,
    /// Event bus construction settings.
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session_id: Some(IdGenerator::new().generate_run_id()),
            checkpointer: Some(CheckpointerType::InMemory),
            sqlite_db_name: Self::resolve_sqlite_db_name(None),
            step_limit: DEFAULT_STEP_LIMIT,
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    fn resolve_sqlite_db_name(provided: Option<String>) -> Option<String> {
        if let Some(name) = provided {
            return Some(name);
        }
        dotenvy::dotenv().ok();
        Some(std::env::var("SQLITE_DB_NAME").unwrap_or_else(|_| "dialogweave.db".to_string()))
    }

    pub fn new(
        session_id: Option<String>,
        checkpointer: Option<CheckpointerType>,
        sqlite_db_name: Option<String>,
    ) -> Self {
        Self {
            session_id,
            checkpointer,
            sqlite_db_name: Self::resolve_sqlite_db_name(sqlite_db_name),
            step_limit: DEFAULT_STEP_LIMIT,
            event_bus: EventBusConfig::default(),
        }
    }

    #[must_use]
    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit.max(1);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_memory_event_bus(self) -> Self {
        self.with_event_bus(EventBusConfig::with_memory_sink())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Declarative event bus configuration, materialized per runner.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn new(sinks: Vec<SinkConfig>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self::new(vec![SinkConfig::StdOut])
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self::new(vec![SinkConfig::StdOut, SinkConfig::Memory])
    }

    /// Build a fresh [`EventBus`] with the configured sinks.
    pub fn build_event_bus(&self) -> EventBus {
        let sinks: Vec<Box<dyn crate::event_bus::EventSink>> = self
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::StdOut => {
                    Box::new(StdOutSink::default()) as Box<dyn crate::event_bus::EventSink>
                }
                SinkConfig::Memory => Box::new(MemorySink::new()),
            })
            .collect();
        EventBus::with_sinks(sinks)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}
