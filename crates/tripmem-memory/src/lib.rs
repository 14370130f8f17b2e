//! tripmem Memory System
//!
//! Hybrid user memory for a conversational travel agent.
//!
//! # Components
//!
//! - **Preference Store**: per-user key/value facts, one JSON file per user
//! - **Semantic Memory Store**: append-only log of embedded text entries,
//!   searchable by similarity and time
//! - **Memory Exchange**: portable export/import of semantic memory
//! - **Memory Façade**: formats both stores as context text for a prompt
//!
//! # Features
//!
//! - Atomic preference writes and per-user serialized updates
//! - Exact search for small stores, HNSW for large ones
//! - Idempotent import (upsert keyed by entry id)
//! - Pluggable embedding providers

pub mod config;
pub mod embeddings;
pub mod entry;
pub mod exchange;
pub mod facade;
pub mod preferences;
pub mod semantic;
pub mod similarity;
pub mod storage;
pub mod vector_index;

pub use config::MemoryConfig;
pub use embeddings::{
    create_provider, EmbeddingConfig, EmbeddingError, EmbeddingProvider, EmbeddingProviderType,
    MockEmbeddingProvider, StaticEmbeddingProvider,
};
#[cfg(feature = "openai")]
pub use embeddings::OpenAIEmbeddingProvider;
pub use entry::{MemoryEntry, ScoredEntry};
pub use exchange::{
    read_export, write_export, ExportMetadata, ExportRecord, ImportReport, MemoryExchange,
    SkippedRecord,
};
pub use facade::MemoryFacade;
pub use preferences::{humanize_key, PreferenceStore, Preferences, NO_PREFERENCES};
pub use semantic::{SemanticMemoryStore, NO_RELATED_MEMORY};
pub use similarity::SimilarityMetric;
pub use storage::{EntryStorage, InMemoryEntryStorage, MemoryStorageConfig, RocksDbEntryStorage};
pub use vector_index::{IndexConfig, SearchHit, VectorIndex};
