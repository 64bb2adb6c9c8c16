//! Run, message, and token id generation.

use uuid::Uuid;

/// Generates the identifiers the engine hands out: run (session) ids,
/// streaming message ids, and interrupt token ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Opaque id scoping one conversation's checkpoint lineage.
    #[must_use]
    pub fn generate_run_id(&self) -> String {
        format!("run-{}", Uuid::new_v4())
    }

    /// Short stable id keying streaming partial/complete events, matching
    /// the `msg-xxxxxxxx` shape consumers expect.
    #[must_use]
    pub fn generate_message_id(&self) -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!("msg-{}", &uuid[..8])
    }

    /// Id for an interrupt token.
    #[must_use]
    pub fn generate_token_id(&self) -> String {
        format!("intr-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_short_and_unique() {
        let generator = IdGenerator::new();
        let a = generator.generate_message_id();
        let b = generator.generate_message_id();
        assert!(a.starts_with("msg-"));
        assert_eq!(a.len(), "msg-".len() + 8);
        assert_ne!(a, b);
    }
}
