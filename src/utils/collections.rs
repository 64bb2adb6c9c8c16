//! Constructors for the channel collection types, so call sites don't
//! repeat the hasher spelling.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// New, empty extra-channel map.
#[must_use]
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}

/// New, empty accumulate-channel map.
#[must_use]
pub fn new_accum_map() -> FxHashMap<String, Vec<Value>> {
    FxHashMap::default()
}
