//! Per-user preference store
//!
//! Each user's preferences are a flat string-to-string mapping kept in
//! `{dir}/{user_id}.json` as a pretty-printed JSON object. Writes replace the
//! file atomically (temp file in the same directory, fsync, rename), and every
//! read-modify-write cycle holds a per-user lock so concurrent updates to
//! different keys of the same user are never lost.

use std::collections::{BTreeMap, HashMap};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use tripmem_core::{Error, Result, UserId};

/// Rendered by [`PreferenceStore::format_for_context`] for an empty record
pub const NO_PREFERENCES: &str = "No known preferences.";

/// A user's preferences, ordered by key
pub type Preferences = BTreeMap<String, String>;

/// Turn `departure_city` into `Departure city`
pub fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// File-backed preference store
pub struct PreferenceStore {
    /// Directory holding one JSON file per user
    dir: PathBuf,

    /// Per-user write locks, present only while in use
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl PreferenceStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        info!("Opened preference store at {}", dir.display());

        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the preference files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user: &UserId) -> PathBuf {
        self.dir.join(format!("{}.json", user))
    }

    fn user_lock(&self, user: &UserId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Internal("Failed to acquire lock registry".to_string()))?;
        Ok(Arc::clone(locks.entry(user.clone()).or_default()))
    }

    /// Drop `lock`, and its registry slot if no other caller holds it
    fn release_user_lock(&self, user: &UserId, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        drop(lock);
        if locks.get(user).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(user);
        }
    }

    /// Run `f` while holding `user`'s write lock
    fn with_user_lock<T>(&self, user: &UserId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.user_lock(user)?;
        let result = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(Error::Internal(format!("Failed to acquire lock for user {}", user))),
        };
        self.release_user_lock(user, lock);
        result
    }

    /// Load a user's preferences
    ///
    /// Never fails: a missing record, an unreadable file or an invalid user
    /// id all yield an empty mapping.
    pub fn load(&self, user_id: &str) -> Preferences {
        match UserId::parse(user_id) {
            Ok(user) => self.read_record(&user),
            Err(e) => {
                warn!("Ignoring preference lookup: {}", e);
                Preferences::new()
            }
        }
    }

    fn read_record(&self, user: &UserId) -> Preferences {
        let path = self.path_for(user);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Preferences::new(),
            Err(e) => {
                warn!("Failed to read preferences for {} at {}: {}", user, path.display(), e);
                return Preferences::new();
            }
        };

        match serde_json::from_slice::<BTreeMap<String, serde_json::Value>>(&bytes) {
            Ok(raw) => raw
                .into_iter()
                .filter_map(|(key, value)| match value {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some((key, s)),
                    other => Some((key, other.to_string())),
                })
                .collect(),
            Err(e) => {
                warn!("Corrupt preference file for {}, treating as empty: {}", user, e);
                Preferences::new()
            }
        }
    }

    fn write_record(&self, user: &UserId, prefs: &Preferences) -> Result<()> {
        let json = serde_json::to_vec_pretty(prefs)
            .map_err(|e| Error::Serialization(format!("Failed to serialize preferences: {}", e)))?;

        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(self.path_for(user)).map_err(|e| Error::Io(e.error))?;

        debug!("Saved {} preferences for {}", prefs.len(), user);
        Ok(())
    }

    /// Replace a user's preferences with `prefs`
    pub fn save(&self, user_id: &str, prefs: &Preferences) -> Result<()> {
        let user = UserId::parse(user_id)?;
        self.with_user_lock(&user, || self.write_record(&user, prefs))
    }

    /// Set one preference, keeping every other key
    pub fn update(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        self.update_many(user_id, [(key, value)])
    }

    /// Set several preferences in one read-modify-write cycle
    pub fn update_many<'a, I>(&self, user_id: &str, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let user = UserId::parse(user_id)?;
        let pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        if let Some((key, _)) = pairs.iter().find(|(key, _)| key.trim().is_empty()) {
            return Err(Error::InvalidInput(format!(
                "Preference key '{}' is empty",
                key
            )));
        }

        self.with_user_lock(&user, || {
            let mut prefs = self.read_record(&user);
            for (key, value) in pairs {
                prefs.insert(key.to_string(), value.to_string());
            }
            self.write_record(&user, &prefs)
        })
    }

    /// Keep only the keys in `allowed_keys`, returning how many were removed
    pub fn filter_keys(&self, user_id: &str, allowed_keys: &[&str]) -> Result<usize> {
        let user = UserId::parse(user_id)?;

        self.with_user_lock(&user, || {
            let mut prefs = self.read_record(&user);
            let before = prefs.len();
            prefs.retain(|key, _| allowed_keys.contains(&key.as_str()));
            let removed = before - prefs.len();

            self.write_record(&user, &prefs)?;
            if removed > 0 {
                info!("Removed {} preference keys for {}", removed, user);
            }
            Ok(removed)
        })
    }

    /// Get a single preference
    pub fn get(&self, user_id: &str, key: &str) -> Option<String> {
        self.load(user_id).remove(key)
    }

    /// Get a single preference with a fallback
    pub fn get_or(&self, user_id: &str, key: &str, default: &str) -> String {
        self.get(user_id, key).unwrap_or_else(|| default.to_string())
    }

    /// Delete a user's record; returns whether one existed
    pub fn remove_user(&self, user_id: &str) -> Result<bool> {
        let user = UserId::parse(user_id)?;

        self.with_user_lock(&user, || match std::fs::remove_file(self.path_for(&user)) {
            Ok(()) => {
                info!("Removed preferences for {}", user);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
    }

    /// Render preferences as `Key: Value` lines in key order
    pub fn format_for_context(&self, user_id: &str) -> String {
        let prefs = self.load(user_id);
        if prefs.is_empty() {
            return NO_PREFERENCES.to_string();
        }

        prefs
            .iter()
            .map(|(key, value)| format!("{}: {}", humanize_key(key), value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn create_test_store() -> (PreferenceStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = PreferenceStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_missing_record_is_empty() {
        let (store, _dir) = create_test_store();
        assert!(store.load("nobody").is_empty());
        assert_eq!(store.get_or("nobody", "budget", "Not specified"), "Not specified");
    }

    #[test]
    fn test_update_isolation() {
        let (store, _dir) = create_test_store();
        store.update("alice", "a", "1").unwrap();
        store.update("alice", "b", "2").unwrap();

        let expected: Preferences = [("a", "1"), ("b", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(store.load("alice"), expected);
        assert!(store.load("bob").is_empty());
    }

    #[test]
    fn test_concurrent_updates_keep_every_key() {
        let (store, _dir) = create_test_store();
        let n = 32;

        std::thread::scope(|s| {
            for i in 0..n {
                let store = &store;
                s.spawn(move || {
                    store
                        .update("alice", &format!("key_{}", i), &format!("value_{}", i))
                        .unwrap();
                });
            }
        });

        let prefs = store.load("alice");
        assert_eq!(prefs.len(), n);
        for i in 0..n {
            assert_eq!(prefs[&format!("key_{}", i)], format!("value_{}", i));
        }
    }

    #[test]
    fn test_idle_user_locks_are_released() {
        let (store, _dir) = create_test_store();

        std::thread::scope(|s| {
            for i in 0..16 {
                let store = &store;
                s.spawn(move || {
                    let user = format!("traveller_{}", i % 4);
                    store.update(&user, "seat", "aisle").unwrap();
                });
            }
        });
        store.remove_user("traveller_0").unwrap();

        assert!(store.locks.lock().unwrap().is_empty());
        assert_eq!(store.get("traveller_3", "seat"), Some("aisle".to_string()));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let (store, dir) = create_test_store();
        store.update("alice", "destination", "Oslo").unwrap();

        std::fs::write(dir.path().join("alice.json"), "{ this is not json").unwrap();
        assert!(store.load("alice").is_empty());

        // The next write starts from a clean record
        store.update("alice", "budget", "low").unwrap();
        assert_eq!(store.load("alice").len(), 1);
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let (store, dir) = create_test_store();
        std::fs::write(
            dir.path().join("alice.json"),
            r#"{"budget": 1500, "flexible": true, "interests": ["food", "art"], "style": null}"#,
        )
        .unwrap();

        let prefs = store.load("alice");
        assert_eq!(prefs["budget"], "1500");
        assert_eq!(prefs["flexible"], "true");
        assert_eq!(prefs["interests"], r#"["food","art"]"#);
        assert!(!prefs.contains_key("style"));
    }

    #[test]
    fn test_filter_keys() {
        let (store, _dir) = create_test_store();
        store
            .update_many(
                "alice",
                [("destination", "Rome"), ("budget", "mid"), ("legacy_flag", "x")],
            )
            .unwrap();

        let removed = store.filter_keys("alice", &["destination", "budget"]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            store.load("alice").keys().collect::<Vec<_>>(),
            vec!["budget", "destination"]
        );
    }

    #[test]
    fn test_format_for_context() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.format_for_context("alice"), NO_PREFERENCES);

        store.update("alice", "interests", "museums").unwrap();
        store.update("alice", "departure_city", "Berlin").unwrap();
        assert_eq!(
            store.format_for_context("alice"),
            "Departure city: Berlin\nInterests: museums"
        );
    }

    #[test]
    fn test_humanize_key() {
        assert_eq!(humanize_key("return_date"), "Return date");
        assert_eq!(humanize_key("budget"), "Budget");
        assert_eq!(humanize_key(""), "");
    }

    #[test]
    fn test_invalid_user_ids() {
        let (store, dir) = create_test_store();
        assert!(matches!(
            store.update("../escape", "k", "v"),
            Err(Error::InvalidUserId(_))
        ));
        assert!(store.load("../escape").is_empty());
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());
    }

    #[test]
    fn test_empty_key_rejected() {
        let (store, _dir) = create_test_store();
        assert!(matches!(
            store.update("alice", " ", "v"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_remove_user() {
        let (store, _dir) = create_test_store();
        store.update("alice", "style", "slow travel").unwrap();

        assert!(store.remove_user("alice").unwrap());
        assert!(store.load("alice").is_empty());
        assert!(!store.remove_user("alice").unwrap());
    }

    #[test]
    fn test_file_is_pretty_json() {
        let (store, dir) = create_test_store();
        store.update("alice", "destination", "Kyoto").unwrap();

        let text = std::fs::read_to_string(dir.path().join("alice.json")).unwrap();
        assert!(text.contains("\n  \"destination\": \"Kyoto\""));
    }

    proptest! {
        #[test]
        fn prop_save_load_round_trip(prefs in prop::collection::btree_map("[a-z_]{1,12}", ".{0,24}", 0..8)) {
            let (store, _dir) = create_test_store();
            store.save("alice", &prefs).unwrap();
            prop_assert_eq!(store.load("alice"), prefs);
        }
    }
}
