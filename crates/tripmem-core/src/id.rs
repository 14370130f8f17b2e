//! Identifier types for tripmem
//!
//! A [`UserId`] names the owner of a preference record and of memory entries.
//! It doubles as a file name for the preference record, so it is validated
//! up front. An [`EntryId`] has the form `{user_id}_{suffix}` where the suffix
//! is a simple-format UUIDv4.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum length of a user id in bytes
pub const MAX_USER_ID_LEN: usize = 128;

/// Opaque, validated user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a user id
    ///
    /// Rejects empty ids, ids longer than [`MAX_USER_ID_LEN`], path separators,
    /// `..` and control characters.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidUserId("empty user id".to_string()));
        }
        if raw.len() > MAX_USER_ID_LEN {
            return Err(Error::InvalidUserId(format!(
                "user id longer than {} bytes",
                MAX_USER_ID_LEN
            )));
        }
        if raw == "." || raw.contains("..") {
            return Err(Error::InvalidUserId(format!("'{}' is not allowed", raw)));
        }
        if raw
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(Error::InvalidUserId(format!(
                "'{}' contains a path separator or control character",
                raw.escape_default()
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique identifier of a memory entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

impl EntryId {
    /// Generate a fresh id for an entry owned by `user`
    pub fn generate(user: &UserId) -> Self {
        Self(format!("{}_{}", user.as_str(), Uuid::new_v4().simple()))
    }

    /// Accept an existing id, e.g. from an export document
    ///
    /// Ids are opaque, so only emptiness and control characters are checked.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidEntryId("empty entry id".to_string()));
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(Error::InvalidEntryId(format!(
                "'{}' contains a control character",
                raw.escape_default()
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether this id carries the `{user}_` prefix of a generated id
    pub fn has_owner_prefix(&self, user: &UserId) -> bool {
        self.0
            .strip_prefix(user.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

impl TryFrom<String> for EntryId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_user_id_accepts_plain_ids() {
        assert!(UserId::parse("alice").is_ok());
        assert!(UserId::parse("user-42@example.com").is_ok());
        assert!(UserId::parse("Åsa Lindqvist").is_ok());
    }

    #[test]
    fn test_user_id_rejects_paths() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("..").is_err());
        assert!(UserId::parse("../etc/passwd").is_err());
        assert!(UserId::parse("a/b").is_err());
        assert!(UserId::parse("a\\b").is_err());
        assert!(UserId::parse("a\0b").is_err());
        assert!(UserId::parse(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_entry_id_generation() {
        let user = UserId::parse("alice").unwrap();
        let id1 = EntryId::generate(&user);
        let id2 = EntryId::generate(&user);

        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("alice_"));
        assert!(id1.has_owner_prefix(&user));
        assert_eq!(id1.as_str().len(), "alice_".len() + 32);
    }

    #[test]
    fn test_owner_prefix_requires_separator() {
        let ali = UserId::parse("ali").unwrap();
        let alice = UserId::parse("alice").unwrap();
        let id = EntryId::generate(&alice);
        assert!(!id.has_owner_prefix(&ali));
    }

    #[test]
    fn test_entry_id_serde_validates() {
        let ok: std::result::Result<EntryId, _> = serde_json::from_str("\"bob_123\"");
        assert!(ok.is_ok());
        let bad: std::result::Result<EntryId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_ids_keep_owner(name in "[a-zA-Z0-9_-]{1,32}") {
            let user = UserId::parse(&name).unwrap();
            let id = EntryId::generate(&user);
            prop_assert!(id.has_owner_prefix(&user));
            prop_assert!(EntryId::parse(id.as_str()).is_ok());
        }
    }
}
