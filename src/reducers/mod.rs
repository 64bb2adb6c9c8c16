//! State merge strategies.
//!
//! Every reducer mutates [`VersionedState`] with the data a `NodePartial`
//! carries for its channel. Reducers must be pure and associative, and —
//! because fan-out batches merge in declared order regardless of
//! completion order — their combined effect must not depend on when each
//! invocation finished.

mod add_errors;
mod add_messages;
mod append_lists;
mod map_merge;
mod reducer_registry;

pub use add_errors::AddErrors;
pub use add_messages::AddMessages;
pub use append_lists::AppendLists;
pub use map_merge::MapMerge;
pub use reducer_registry::ReducerRegistry;

use crate::node::NodePartial;
use crate::state::VersionedState;
use crate::types::ChannelType;
use std::fmt;

/// Unified reducer trait: apply a `NodePartial` delta to the state.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial);
}

#[derive(Debug)]
pub enum ReducerError {
    UnknownChannel(ChannelType),
}

impl fmt::Display for ReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerError::UnknownChannel(channel) => {
                write!(f, "no reducers registered for channel: {channel:?}")
            }
        }
    }
}

impl std::error::Error for ReducerError {}
