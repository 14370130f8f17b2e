//! Semantic memory entries

use serde::{Deserialize, Serialize};
use tripmem_core::{EntryId, Timestamp, UserId};

/// One immutable, timestamped memory with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Globally unique identifier, `{user_id}_{suffix}` for appended entries
    pub id: EntryId,

    /// Owner of this memory
    pub user_id: UserId,

    /// Primary text (e.g. a trip summary or user message)
    pub text: String,

    /// Optional paired reply
    pub reply: Option<String>,

    /// Embedding of [`MemoryEntry::payload`]
    pub embedding: Vec<f32>,

    /// When the entry was created
    pub created_at: Timestamp,

    /// Store-assigned insertion sequence number
    pub seq: u64,
}

impl MemoryEntry {
    /// The searchable payload: text, plus the reply on its own line
    pub fn payload(&self) -> String {
        compose_payload(&self.text, self.reply.as_deref())
    }

    /// Whether this entry belongs to `user`
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }
}

/// Join a text and an optional reply into a single payload
pub fn compose_payload(text: &str, reply: Option<&str>) -> String {
    match reply.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reply) => format!("{}\n{}", text.trim(), reply),
        None => text.trim().to_string(),
    }
}

/// An entry with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    /// The matched entry
    pub entry: MemoryEntry,

    /// Similarity score (higher is more similar)
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, reply: Option<&str>) -> MemoryEntry {
        let user = UserId::parse("alice").unwrap();
        MemoryEntry {
            id: EntryId::generate(&user),
            user_id: user,
            text: text.to_string(),
            reply: reply.map(str::to_string),
            embedding: vec![1.0, 0.0],
            created_at: Timestamp::now(),
            seq: 0,
        }
    }

    #[test]
    fn test_payload_without_reply() {
        assert_eq!(entry("Trip to Rome", None).payload(), "Trip to Rome");
    }

    #[test]
    fn test_payload_with_reply() {
        let e = entry("What should I pack?", Some("Light layers"));
        assert_eq!(e.payload(), "What should I pack?\nLight layers");
    }

    #[test]
    fn test_blank_reply_ignored() {
        assert_eq!(compose_payload(" Lisbon ", Some("   ")), "Lisbon");
    }

    #[test]
    fn test_ownership() {
        let e = entry("x", None);
        assert!(e.is_owned_by(&UserId::parse("alice").unwrap()));
        assert!(!e.is_owned_by(&UserId::parse("bob").unwrap()));
    }

    #[test]
    fn test_bincode_round_trip() {
        let e = entry("Trip to Kyoto", Some("Booked"));
        let bytes = bincode::serialize(&e).unwrap();
        let back: MemoryEntry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, e);
    }
}
