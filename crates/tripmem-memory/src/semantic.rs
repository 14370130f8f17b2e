//! Semantic memory store
//!
//! An append-only log of timestamped text entries, each with an embedding,
//! searchable by similarity and creation time.
//!
//! Entries live in durable [`EntryStorage`] and are mirrored in memory next to
//! a [`VectorIndex`]. Both sit behind one `RwLock`: queries share the read
//! lock, and a commit (id allocation, storage write, index insert) holds the
//! write lock without awaiting, so readers never observe half an entry and a
//! cancelled append leaves nothing behind.

use crate::embeddings::EmbeddingProvider;
use crate::entry::{compose_payload, MemoryEntry, ScoredEntry};
use crate::storage::{EntryStorage, InMemoryEntryStorage, MemoryStorageConfig, RocksDbEntryStorage};
use crate::vector_index::{IndexConfig, VectorIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};
use tripmem_core::{EntryId, Error, MonotonicClock, Result, Timestamp, UserId};

/// Rendered by [`SemanticMemoryStore::format_snippets`] when nothing matches
pub const NO_RELATED_MEMORY: &str = "No related memories.";

/// Whether an import created a new entry or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Everything guarded by the store lock
struct MemoryState {
    index: VectorIndex,
    entries: BTreeMap<u64, MemoryEntry>,
    /// Persisted entries embedded by another provider; exported, never searched
    stale: BTreeMap<u64, MemoryEntry>,
    /// Every persisted id, stale ones included
    ids: HashMap<EntryId, u64>,
    next_seq: u64,
}

impl MemoryState {
    /// Index then persist one entry; the index is restored if storage fails
    fn commit(&mut self, storage: &dyn EntryStorage, entry: MemoryEntry) -> Result<()> {
        let previous = self.entries.get(&entry.seq);

        self.index
            .insert(entry.seq, entry.embedding.clone(), entry.created_at)?;

        if let Err(e) = storage.store_entry(&entry) {
            match previous {
                Some(prev) => {
                    self.index
                        .insert(prev.seq, prev.embedding.clone(), prev.created_at)?;
                }
                None => {
                    self.index.remove(entry.seq);
                }
            }
            return Err(e);
        }

        self.ids.insert(entry.id.clone(), entry.seq);
        self.next_seq = self.next_seq.max(entry.seq + 1);
        self.stale.remove(&entry.seq);
        self.entries.insert(entry.seq, entry);
        Ok(())
    }
}

/// Append-only semantic memory with similarity search
pub struct SemanticMemoryStore {
    /// Durable entry storage
    storage: Arc<dyn EntryStorage>,

    /// Embedding provider; fixes the store dimension
    provider: Arc<dyn EmbeddingProvider>,

    /// Index and in-memory entries
    state: RwLock<MemoryState>,

    /// Source of strictly increasing creation times
    clock: MonotonicClock,

    /// Embedding dimension of every entry
    dimension: usize,
}

impl SemanticMemoryStore {
    /// Open a RocksDB-backed store
    pub fn open(
        storage_config: MemoryStorageConfig,
        index_config: IndexConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let storage = RocksDbEntryStorage::open(storage_config)?;
        Self::with_storage(Arc::new(storage), provider, index_config)
    }

    /// Create an ephemeral store (for testing)
    pub fn in_memory(provider: Arc<dyn EmbeddingProvider>, index_config: IndexConfig) -> Result<Self> {
        Self::with_storage(Arc::new(InMemoryEntryStorage::new()), provider, index_config)
    }

    /// Create a store over an existing storage backend
    ///
    /// Every persisted entry is loaded in insertion order and the index is
    /// rebuilt from the stored embeddings. Entries whose dimension disagrees
    /// with the provider stay out of search but keep their id and position,
    /// so an export still carries them and an import re-embeds them in place.
    pub fn with_storage(
        storage: Arc<dyn EntryStorage>,
        provider: Arc<dyn EmbeddingProvider>,
        index_config: IndexConfig,
    ) -> Result<Self> {
        let dimension = provider.dimensions();
        if dimension == 0 {
            return Err(Error::Configuration(
                "Embedding provider reports zero dimensions".to_string(),
            ));
        }
        if let Some(configured) = index_config.dimension {
            if configured != dimension {
                return Err(Error::Configuration(format!(
                    "Index configured for {} dimensions but provider '{}' produces {}",
                    configured,
                    provider.model_name(),
                    dimension
                )));
            }
        }

        let mut state = MemoryState {
            index: VectorIndex::new(index_config.with_dimension(dimension))?,
            entries: BTreeMap::new(),
            stale: BTreeMap::new(),
            ids: HashMap::new(),
            next_seq: 0,
        };
        let clock = MonotonicClock::new();

        for entry in storage.load_entries()? {
            state.next_seq = state.next_seq.max(entry.seq + 1);
            state.ids.insert(entry.id.clone(), entry.seq);

            if entry.embedding.len() != dimension {
                warn!(
                    "Entry {} not searchable: embedding has {} dimensions, expected {}",
                    entry.id,
                    entry.embedding.len(),
                    dimension
                );
                state.stale.insert(entry.seq, entry);
                continue;
            }

            state
                .index
                .insert(entry.seq, entry.embedding.clone(), entry.created_at)?;
            clock.observe(entry.created_at);
            state.entries.insert(entry.seq, entry);
        }

        info!(
            "Opened semantic memory with {} entries ({} stale), provider '{}' ({} dimensions)",
            state.entries.len(),
            state.stale.len(),
            provider.model_name(),
            dimension
        );

        Ok(Self {
            storage,
            provider,
            state: RwLock::new(state),
            clock,
            dimension,
        })
    }

    /// Embedding dimension of this store
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the embedding provider
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| Error::Internal("Failed to acquire memory read lock".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| Error::Internal("Failed to acquire memory write lock".to_string()))
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: embedding.len(),
            });
        }
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.provider.embed(text).await?;
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    /// Append a new memory for `user_id`
    ///
    /// The payload (`text`, plus `reply` on its own line) is embedded before
    /// anything is locked. A provider failure or dimension mismatch leaves
    /// the store untouched.
    pub async fn append(&self, user_id: &str, text: &str, reply: Option<&str>) -> Result<EntryId> {
        let user = UserId::parse(user_id)?;
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Memory text is empty".to_string()));
        }

        let payload = compose_payload(text, reply);
        let embedding = self.embed(&payload).await?;

        let reply = reply
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        self.commit_new(user, text.trim().to_string(), reply, embedding)
    }

    fn commit_new(
        &self,
        user: UserId,
        text: String,
        reply: Option<String>,
        embedding: Vec<f32>,
    ) -> Result<EntryId> {
        let mut state = self.write_state()?;

        let id = loop {
            let candidate = EntryId::generate(&user);
            if !state.ids.contains_key(&candidate) {
                break candidate;
            }
        };

        let entry = MemoryEntry {
            id: id.clone(),
            user_id: user,
            text,
            reply,
            embedding,
            created_at: self.clock.tick(),
            seq: state.next_seq,
        };

        debug!("Appending entry {} for user {}", entry.id, entry.user_id);
        state.commit(self.storage.as_ref(), entry)?;
        Ok(id)
    }

    /// Insert or replace an entry under its original id
    ///
    /// The text is embedded afresh. An existing id, stale or not, keeps its
    /// insertion position and is replaced in place. The imported timestamp is
    /// stored as given and does not move the append clock.
    pub(crate) async fn upsert_imported(
        &self,
        id: EntryId,
        user: UserId,
        text: String,
        created_at: Timestamp,
    ) -> Result<UpsertOutcome> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(format!("Record {} has no text", id)));
        }

        let embedding = self.embed(&text).await?;

        let mut state = self.write_state()?;
        let (seq, outcome) = match state.ids.get(&id) {
            Some(seq) => (*seq, UpsertOutcome::Updated),
            None => (state.next_seq, UpsertOutcome::Inserted),
        };

        let entry = MemoryEntry {
            id,
            user_id: user,
            text,
            reply: None,
            embedding,
            created_at,
            seq,
        };

        state.commit(self.storage.as_ref(), entry)?;
        Ok(outcome)
    }

    /// Rank entries against `text`
    ///
    /// Returns at most `top_k` entries created at or after `since`, best
    /// match first; equal scores put the most recent entry first.
    pub async fn query_entries(
        &self,
        text: &str,
        top_k: usize,
        since: Option<Timestamp>,
    ) -> Result<Vec<ScoredEntry>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed(text).await?;

        let state = self.read_state()?;
        let hits = state.index.search(&query, top_k, since)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                state.entries.get(&hit.key).map(|entry| ScoredEntry {
                    entry: entry.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Payloads of the best `top_k` matches for `text`
    pub async fn query(&self, text: &str, top_k: usize, since: Option<Timestamp>) -> Result<Vec<String>> {
        Ok(self
            .query_entries(text, top_k, since)
            .await?
            .into_iter()
            .map(|scored| scored.entry.payload())
            .collect())
    }

    /// Render matches as a bulleted block for a prompt
    pub async fn format_snippets(
        &self,
        text: &str,
        top_k: usize,
        since: Option<Timestamp>,
    ) -> Result<String> {
        let payloads = self.query(text, top_k, since).await?;
        if payloads.is_empty() {
            return Ok(NO_RELATED_MEMORY.to_string());
        }

        Ok(payloads
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Remove every entry owned by `user_id`
    pub fn forget(&self, user_id: &str) -> Result<usize> {
        let user = UserId::parse(user_id)?;
        let mut state = self.write_state()?;

        let mut seqs: HashSet<u64> = self
            .storage
            .delete_user_entries(&user)?
            .into_iter()
            .map(|e| e.seq)
            .collect();
        seqs.extend(
            state
                .entries
                .values()
                .filter(|e| e.is_owned_by(&user))
                .map(|e| e.seq),
        );

        let seqs: Vec<u64> = seqs.into_iter().collect();
        state.index.remove_many(&seqs);

        let mut removed = 0;
        for seq in &seqs {
            let entry = match state.entries.remove(seq) {
                Some(entry) => Some(entry),
                None => state.stale.remove(seq),
            };
            if let Some(entry) = entry {
                state.ids.remove(&entry.id);
                removed += 1;
            }
        }

        info!("Forgot {} entries for user {}", removed, user);
        Ok(removed)
    }

    /// Number of searchable entries
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_state()?.entries.len())
    }

    /// Check if the store holds no entries
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read_state()?.entries.is_empty())
    }

    /// Number of entries owned by `user_id`
    pub fn user_entry_count(&self, user_id: &str) -> Result<usize> {
        let user = UserId::parse(user_id)?;
        Ok(self
            .read_state()?
            .entries
            .values()
            .filter(|e| e.is_owned_by(&user))
            .count())
    }

    /// Get an entry by id
    pub fn get(&self, id: &EntryId) -> Result<Option<MemoryEntry>> {
        let state = self.read_state()?;
        Ok(state
            .ids
            .get(id)
            .and_then(|seq| state.entries.get(seq))
            .cloned())
    }

    /// All persisted entries, stale ones included, in insertion order
    pub(crate) fn snapshot(&self) -> Result<Vec<MemoryEntry>> {
        let state = self.read_state()?;
        let mut all: Vec<MemoryEntry> = state
            .entries
            .values()
            .chain(state.stale.values())
            .cloned()
            .collect();
        all.sort_by_key(|e| e.seq);
        Ok(all)
    }

    /// Flush pending writes to storage
    pub fn flush(&self) -> Result<()> {
        self.storage.flush()
    }
}
