//! Durable storage for memory entries
//!
//! Provides persistent storage for semantic memory entries using RocksDB,
//! plus an in-memory backend for tests and ephemeral stores.
//!
//! The storage trait is synchronous: the semantic store calls it from inside
//! its index write lock, and that critical section must not contain an
//! `.await` (a cancelled append must leave no half-committed entry).

use crate::entry::MemoryEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use tripmem_core::{EntryId, Error, Result, UserId};

/// Configuration for entry storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Path to the storage directory
    pub path: String,

    /// Enable write-ahead logging for durability
    pub enable_wal: bool,

    /// Sync writes to disk immediately (slower but more durable)
    pub sync_writes: bool,

    /// Maximum write buffer size in bytes
    pub write_buffer_size: usize,

    /// Enable compression for stored data
    pub enable_compression: bool,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            path: "data/memory".to_string(),
            enable_wal: true,
            sync_writes: false,
            write_buffer_size: 64 * 1024 * 1024, // 64MB
            enable_compression: true,
        }
    }
}

impl MemoryStorageConfig {
    /// Create config for a given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    /// Create config for testing with temporary directory
    pub fn for_testing(path: &Path) -> Self {
        Self {
            path: path.to_string_lossy().to_string(),
            enable_wal: true,
            sync_writes: false,
            write_buffer_size: 4 * 1024 * 1024, // 4MB for tests
            enable_compression: false,
        }
    }
}

/// Trait for entry storage backends
pub trait EntryStorage: Send + Sync {
    /// Insert or replace an entry, keyed by its sequence number
    ///
    /// If another sequence number is already recorded for the entry id, the
    /// call is rejected: ids are unique across the store.
    fn store_entry(&self, entry: &MemoryEntry) -> Result<()>;

    /// Get an entry by id
    fn get_entry(&self, id: &EntryId) -> Result<Option<MemoryEntry>>;

    /// All entries in insertion order; undecodable records are skipped
    fn load_entries(&self) -> Result<Vec<MemoryEntry>>;

    /// Delete every entry owned by `user`, returning the removed entries
    fn delete_user_entries(&self, user: &UserId) -> Result<Vec<MemoryEntry>>;

    /// Total number of stored entries
    fn entry_count(&self) -> Result<usize>;

    /// Flush any pending writes to disk
    fn flush(&self) -> Result<()>;
}

/// Column family names for entry storage
mod cf {
    /// Entries indexed by sequence number
    pub const ENTRIES: &str = "memory_entries";

    /// Entry id -> sequence number
    pub const ENTRY_IDS: &str = "memory_entry_ids";

    /// user id + sequence number -> ()
    pub const USER_ENTRIES: &str = "memory_user_entries";
}

/// Key prefixes for entry storage
mod prefix {
    pub const ENTRY: u8 = 0x01;
    pub const ENTRY_ID: u8 = 0x02;
    pub const USER_ENTRY: u8 = 0x03;
}

/// RocksDB-backed entry storage
pub struct RocksDbEntryStorage {
    db: Arc<rocksdb::DB>,
    config: MemoryStorageConfig,
}

impl RocksDbEntryStorage {
    /// Open or create RocksDB-backed entry storage
    pub fn open(config: MemoryStorageConfig) -> Result<Self> {
        info!("Opening memory storage at {}", config.path);

        std::fs::create_dir_all(&config.path)?;

        let mut db_opts = rocksdb::Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.write_buffer_size);

        if config.enable_compression {
            db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        }

        let cf_names = [cf::ENTRIES, cf::ENTRY_IDS, cf::USER_ENTRIES];
        let cf_descriptors: Vec<rocksdb::ColumnFamilyDescriptor> = cf_names
            .iter()
            .map(|name| {
                let mut cf_opts = rocksdb::Options::default();
                if config.enable_compression {
                    cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                }
                rocksdb::ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = rocksdb::DB::open_cf_descriptors(&db_opts, &config.path, cf_descriptors)
            .map_err(|e| Error::Storage(format!("Failed to open memory storage: {}", e)))?;

        info!("Memory storage opened successfully");

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    /// Build entry key: sequence number, big-endian for ordered iteration
    fn entry_key(seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 8);
        key.push(prefix::ENTRY);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    /// Build id lookup key
    fn entry_id_key(id: &EntryId) -> Vec<u8> {
        let id_bytes = id.as_str().as_bytes();
        let mut key = Vec::with_capacity(1 + id_bytes.len());
        key.push(prefix::ENTRY_ID);
        key.extend_from_slice(id_bytes);
        key
    }

    /// Build prefix for scanning all entries of a user
    fn user_prefix(user: &UserId) -> Vec<u8> {
        let user_bytes = user.as_str().as_bytes();
        let mut key = Vec::with_capacity(1 + 2 + user_bytes.len() + 8);
        key.push(prefix::USER_ENTRY);
        // Length-prefixed user id so "ann" never matches "anna"
        key.extend_from_slice(&(user_bytes.len() as u16).to_be_bytes());
        key.extend_from_slice(user_bytes);
        key
    }

    /// Build per-user entry key: user prefix + sequence number
    fn user_entry_key(user: &UserId, seq: u64) -> Vec<u8> {
        let mut key = Self::user_prefix(user);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn decode_seq(bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::DataCorruption("Invalid sequence number bytes".to_string()))?;
        Ok(u64::from_be_bytes(raw))
    }

    fn decode_entry(bytes: &[u8]) -> Result<MemoryEntry> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::Deserialization(format!("Failed to deserialize entry: {}", e)))
    }

    /// Get column family handle
    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Internal(format!("Column family not found: {}", name)))
    }

    fn write_options(&self) -> rocksdb::WriteOptions {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts.disable_wal(!self.config.enable_wal);
        write_opts
    }

    fn get_by_seq(&self, seq: u64) -> Result<Option<MemoryEntry>> {
        let entries_cf = self.cf(cf::ENTRIES)?;
        match self.db.get_cf(entries_cf, Self::entry_key(seq)) {
            Ok(Some(value)) => Self::decode_entry(&value).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read entry: {}", e))),
        }
    }
}

impl EntryStorage for RocksDbEntryStorage {
    fn store_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let entries_cf = self.cf(cf::ENTRIES)?;
        let ids_cf = self.cf(cf::ENTRY_IDS)?;
        let users_cf = self.cf(cf::USER_ENTRIES)?;

        let value = bincode::serialize(entry)
            .map_err(|e| Error::Serialization(format!("Failed to serialize entry: {}", e)))?;

        let id_key = Self::entry_id_key(&entry.id);
        let recorded_seq = self
            .db
            .get_cf(ids_cf, &id_key)
            .map_err(|e| Error::Storage(format!("Failed to read id index: {}", e)))?
            .map(|v| Self::decode_seq(&v))
            .transpose()?;

        if let Some(seq) = recorded_seq {
            if seq != entry.seq {
                return Err(Error::InvalidEntryId(format!(
                    "{} is already stored under sequence {}",
                    entry.id, seq
                )));
            }
        }

        let mut batch = rocksdb::WriteBatch::default();

        // Replacing an entry may move it to another owner
        if let Some(previous) = self.get_by_seq(entry.seq)? {
            if previous.user_id != entry.user_id {
                batch.delete_cf(users_cf, Self::user_entry_key(&previous.user_id, previous.seq));
            }
            if previous.id != entry.id {
                batch.delete_cf(ids_cf, Self::entry_id_key(&previous.id));
            }
        }

        batch.put_cf(entries_cf, Self::entry_key(entry.seq), &value);
        batch.put_cf(ids_cf, &id_key, entry.seq.to_be_bytes());
        batch.put_cf(users_cf, Self::user_entry_key(&entry.user_id, entry.seq), b"");

        self.db
            .write_opt(batch, &self.write_options())
            .map_err(|e| Error::Storage(format!("Failed to store entry: {}", e)))?;

        debug!("Stored entry {} for user {}", entry.id, entry.user_id);

        Ok(())
    }

    fn get_entry(&self, id: &EntryId) -> Result<Option<MemoryEntry>> {
        let ids_cf = self.cf(cf::ENTRY_IDS)?;

        let seq = match self.db.get_cf(ids_cf, Self::entry_id_key(id)) {
            Ok(Some(v)) => Self::decode_seq(&v)?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("Failed to read id index: {}", e))),
        };

        self.get_by_seq(seq)
    }

    fn load_entries(&self) -> Result<Vec<MemoryEntry>> {
        let entries_cf = self.cf(cf::ENTRIES)?;

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(entries_cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.map_err(|e| Error::Storage(e.to_string()))?;

            match Self::decode_entry(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable entry at key {:?}: {}", key, e),
            }
        }

        Ok(entries)
    }

    fn delete_user_entries(&self, user: &UserId) -> Result<Vec<MemoryEntry>> {
        let entries_cf = self.cf(cf::ENTRIES)?;
        let ids_cf = self.cf(cf::ENTRY_IDS)?;
        let users_cf = self.cf(cf::USER_ENTRIES)?;
        let prefix = Self::user_prefix(user);

        let mut batch = rocksdb::WriteBatch::default();
        let mut removed = Vec::new();

        for item in self.db.prefix_iterator_cf(users_cf, &prefix) {
            let (key, _) = item.map_err(|e| Error::Storage(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            let seq = Self::decode_seq(&key[prefix.len()..])?;
            batch.delete_cf(users_cf, &key);
            batch.delete_cf(entries_cf, Self::entry_key(seq));

            match self.get_by_seq(seq) {
                Ok(Some(entry)) => {
                    batch.delete_cf(ids_cf, Self::entry_id_key(&entry.id));
                    removed.push(entry);
                }
                Ok(None) => {}
                Err(e) => warn!("Removing unreadable entry {} for user {}: {}", seq, user, e),
            }
        }

        if batch.len() > 0 {
            self.db
                .write_opt(batch, &self.write_options())
                .map_err(|e| Error::Storage(format!("Failed to delete entries: {}", e)))?;

            info!("Deleted {} entries for user {}", removed.len(), user);
        }

        Ok(removed)
    }

    fn entry_count(&self) -> Result<usize> {
        let entries_cf = self.cf(cf::ENTRIES)?;

        let mut count = 0;
        for item in self.db.iterator_cf(entries_cf, rocksdb::IteratorMode::Start) {
            item.map_err(|e| Error::Storage(e.to_string()))?;
            count += 1;
        }

        Ok(count)
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to flush: {}", e)))?;
        debug!("Memory storage flushed");
        Ok(())
    }
}

/// In-memory storage implementation for tests and ephemeral stores
#[derive(Default)]
pub struct InMemoryEntryStorage {
    entries: RwLock<BTreeMap<u64, MemoryEntry>>,
    ids: RwLock<HashMap<EntryId, u64>>,
}

impl InMemoryEntryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error<T>(_: T) -> Error {
        Error::Internal("Failed to acquire storage lock".to_string())
    }
}

impl EntryStorage for InMemoryEntryStorage {
    fn store_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        let mut ids = self.ids.write().map_err(Self::lock_error)?;

        if let Some(seq) = ids.get(&entry.id) {
            if *seq != entry.seq {
                return Err(Error::InvalidEntryId(format!(
                    "{} is already stored under sequence {}",
                    entry.id, seq
                )));
            }
        }

        if let Some(previous) = entries.insert(entry.seq, entry.clone()) {
            if previous.id != entry.id {
                ids.remove(&previous.id);
            }
        }
        ids.insert(entry.id.clone(), entry.seq);
        Ok(())
    }

    fn get_entry(&self, id: &EntryId) -> Result<Option<MemoryEntry>> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        let ids = self.ids.read().map_err(Self::lock_error)?;
        Ok(ids.get(id).and_then(|seq| entries.get(seq)).cloned())
    }

    fn load_entries(&self) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries.values().cloned().collect())
    }

    fn delete_user_entries(&self, user: &UserId) -> Result<Vec<MemoryEntry>> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        let mut ids = self.ids.write().map_err(Self::lock_error)?;

        let seqs: Vec<u64> = entries
            .values()
            .filter(|e| e.is_owned_by(user))
            .map(|e| e.seq)
            .collect();

        let mut removed = Vec::with_capacity(seqs.len());
        for seq in seqs {
            if let Some(entry) = entries.remove(&seq) {
                ids.remove(&entry.id);
                removed.push(entry);
            }
        }
        Ok(removed)
    }

    fn entry_count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(Self::lock_error)?.len())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tripmem_core::Timestamp;

    fn create_test_storage() -> (RocksDbEntryStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = MemoryStorageConfig::for_testing(temp_dir.path());
        let storage = RocksDbEntryStorage::open(config).unwrap();
        (storage, temp_dir)
    }

    fn entry(user: &str, text: &str, seq: u64) -> MemoryEntry {
        let user = UserId::parse(user).unwrap();
        MemoryEntry {
            id: EntryId::generate(&user),
            user_id: user,
            text: text.to_string(),
            reply: None,
            embedding: vec![1.0, 0.0, 0.0],
            created_at: Timestamp::now(),
            seq,
        }
    }

    fn backends() -> Vec<(Box<dyn EntryStorage>, Option<TempDir>)> {
        let (rocks, dir) = create_test_storage();
        vec![
            (Box::new(rocks), Some(dir)),
            (Box::new(InMemoryEntryStorage::new()), None),
        ]
    }

    #[test]
    fn test_store_and_get_entry() {
        for (storage, _dir) in backends() {
            let e = entry("alice", "Trip to Rome", 0);
            storage.store_entry(&e).unwrap();

            let retrieved = storage.get_entry(&e.id).unwrap().unwrap();
            assert_eq!(retrieved, e);
            assert!(storage
                .get_entry(&EntryId::parse("missing").unwrap())
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_load_entries_in_insertion_order() {
        for (storage, _dir) in backends() {
            // 256 sorts before 3 lexicographically but not as big-endian u64
            for (i, seq) in [3u64, 256, 7].iter().enumerate() {
                storage
                    .store_entry(&entry("alice", &format!("Entry {}", i), *seq))
                    .unwrap();
            }

            let seqs: Vec<u64> = storage.load_entries().unwrap().iter().map(|e| e.seq).collect();
            assert_eq!(seqs, vec![3, 7, 256]);
            assert_eq!(storage.entry_count().unwrap(), 3);
        }
    }

    #[test]
    fn test_delete_user_entries() {
        for (storage, _dir) in backends() {
            for seq in 0..5 {
                storage.store_entry(&entry("ann", "Event", seq)).unwrap();
            }
            storage.store_entry(&entry("anna", "Other user", 5)).unwrap();

            let removed = storage
                .delete_user_entries(&UserId::parse("ann").unwrap())
                .unwrap();
            assert_eq!(removed.len(), 5);
            assert_eq!(storage.entry_count().unwrap(), 1);
            assert_eq!(storage.load_entries().unwrap()[0].user_id.as_str(), "anna");
            for e in removed {
                assert!(storage.get_entry(&e.id).unwrap().is_none());
            }
        }
    }

    #[test]
    fn test_replace_entry_moves_owner() {
        for (storage, _dir) in backends() {
            let original = entry("alice", "Original", 0);
            storage.store_entry(&original).unwrap();

            let mut moved = original.clone();
            moved.user_id = UserId::parse("bob").unwrap();
            moved.text = "Moved".to_string();
            storage.store_entry(&moved).unwrap();

            assert_eq!(storage.entry_count().unwrap(), 1);
            let removed = storage
                .delete_user_entries(&UserId::parse("alice").unwrap())
                .unwrap();
            assert!(removed.is_empty());
            assert_eq!(storage.get_entry(&original.id).unwrap().unwrap().text, "Moved");
        }
    }

    #[test]
    fn test_duplicate_id_under_new_seq_rejected() {
        for (storage, _dir) in backends() {
            let e = entry("alice", "Once", 0);
            storage.store_entry(&e).unwrap();

            let mut dup = e.clone();
            dup.seq = 1;
            assert!(matches!(
                storage.store_entry(&dup),
                Err(Error::InvalidEntryId(_))
            ));
            assert_eq!(storage.entry_count().unwrap(), 1);
        }
    }

    #[test]
    fn test_reopen_persists_entries() {
        let temp_dir = TempDir::new().unwrap();
        let e = entry("alice", "Remember me", 0);
        {
            let storage =
                RocksDbEntryStorage::open(MemoryStorageConfig::for_testing(temp_dir.path())).unwrap();
            storage.store_entry(&e).unwrap();
            storage.flush().unwrap();
        }

        let storage =
            RocksDbEntryStorage::open(MemoryStorageConfig::for_testing(temp_dir.path())).unwrap();
        assert_eq!(storage.load_entries().unwrap(), vec![e]);
    }
}
