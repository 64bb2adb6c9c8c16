//! Workflow runtime: session management, checkpointing, and resumable
//! execution.
//!
//! # Architecture
//!
//! - **[`AppRunner`]** — orchestrates the per-session step loop, the
//!   interrupt/resume protocol, and event emission
//! - **[`Checkpointer`]** — pluggable append-only persistence
//!   ([`InMemoryCheckpointer`] for tests and development,
//!   [`SQLiteCheckpointer`] behind the `sqlite` feature for durability)
//! - **[`SessionState`]** — in-memory representation of a run
//! - **Persistence models** — serde-friendly shapes decoupled from
//!   in-memory types
//!
//! # Example
//!
//! ```rust,no_run
//! use dialogweave::runtimes::{AppRunner, CheckpointerType};
//! use dialogweave::state::VersionedState;
//! # async fn example(app: dialogweave::app::App) -> Result<(), Box<dyn std::error::Error>> {
//! let mut runner = AppRunner::new(app, CheckpointerType::InMemory).await;
//! runner
//!     .create_session("thread-1".into(), VersionedState::new_with_user_message("Hello"))
//!     .await?;
//! let outcome = runner.run_until_settled("thread-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod persistence;
pub mod runner;
pub mod runtime_config;
pub mod session;

pub use checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    restore_session_state,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SQLiteCheckpointer;
pub use persistence::{
    PersistedCheckpoint, PersistedFrontierEntry, PersistedState, PersistenceError,
};
pub use runner::{AppRunner, RunOutcome, RunnerError, StepReport};
pub use runtime_config::{DEFAULT_STEP_LIMIT, EventBusConfig, RuntimeConfig, SinkConfig};
pub use session::{SessionInit, SessionState, SessionStatus, StateVersions};
