//! Versioned state channels.
//!
//! Each channel pairs a payload with a `u32` version counter. Versions are
//! bumped by the barrier (see [`crate::app::App::apply_barrier`]) only when
//! the payload actually changed, which lets checkpoints and step reports
//! track state evolution cheaply.

pub mod errors;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::message::Message;
use errors::ErrorEvent;

/// Common behaviour of a versioned state channel.
pub trait Channel {
    type Payload: Clone;

    /// Borrow the current payload.
    fn get(&self) -> &Self::Payload;

    /// Mutably borrow the payload. Versions are not bumped here; that is
    /// the barrier's responsibility.
    fn get_mut(&mut self) -> &mut Self::Payload;

    /// Current version counter.
    fn version(&self) -> u32;

    /// Overwrite the version counter.
    fn set_version(&mut self, version: u32);

    /// Clone the payload out as an independent snapshot.
    fn snapshot(&self) -> Self::Payload {
        self.get().clone()
    }
}

macro_rules! versioned_channel {
    ($(#[$doc:meta])* $name:ident, $payload:ty) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name {
            payload: $payload,
            version: u32,
        }

        impl $name {
            pub fn new(payload: $payload, version: u32) -> Self {
                Self { payload, version }
            }

            pub fn len(&self) -> usize {
                self.payload.len()
            }

            pub fn is_empty(&self) -> bool {
                self.payload.is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    payload: Default::default(),
                    version: 1,
                }
            }
        }

        impl Channel for $name {
            type Payload = $payload;

            fn get(&self) -> &Self::Payload {
                &self.payload
            }

            fn get_mut(&mut self) -> &mut Self::Payload {
                &mut self.payload
            }

            fn version(&self) -> u32 {
                self.version
            }

            fn set_version(&mut self, version: u32) {
                self.version = version;
            }
        }
    };
}

versioned_channel!(
    /// Conversation history; append-only via the `AddMessages` reducer.
    MessagesChannel,
    Vec<Message>
);

versioned_channel!(
    /// JSON key/value scratch space; last-writer-wins per key.
    ExtrasChannel,
    FxHashMap<String, Value>
);

versioned_channel!(
    /// Named append-accumulate lists (e.g. `research_reports`,
    /// `search_results`). Entries are never removed within a run.
    AccumChannel,
    FxHashMap<String, Vec<Value>>
);

versioned_channel!(
    /// Non-fatal error events collected during the run.
    ErrorsChannel,
    Vec<ErrorEvent>
);
