use std::sync::Arc;

use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::VersionedState};

/// Append-accumulate merge for declared named lists.
///
/// Entries are only ever appended; nothing a previous step wrote is
/// removed. Writes to undeclared lists are applied but logged, so a typo'd
/// list name is visible without losing data.
#[derive(Debug, Clone)]
pub struct AppendLists {
    declared: Arc<Vec<String>>,
}

impl AppendLists {
    pub fn new(declared: Arc<Vec<String>>) -> Self {
        Self { declared }
    }
}

impl Reducer for AppendLists {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(lists) = &update.accum
            && !lists.is_empty()
        {
            let state_lists = state.accum.get_mut();
            for (name, values) in lists.iter() {
                if !self.declared.contains(name) {
                    tracing::warn!(list = %name, "append to undeclared accumulate list");
                }
                state_lists
                    .entry(name.clone())
                    .or_default()
                    .extend(values.iter().cloned());
            }
        }
    }
}
