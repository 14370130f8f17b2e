//! tripmem - hybrid user memory for a conversational travel agent
//!
//! This is the main library crate that re-exports all tripmem components.

pub use tripmem_core as core;
pub use tripmem_memory as memory;

// Re-export commonly used types
pub use tripmem_core::{EntryId, Error, MonotonicClock, Result, Timestamp, UserId};

pub use tripmem_memory::{
    EmbeddingProvider, ExportRecord, ImportReport, MemoryConfig, MemoryExchange, MemoryFacade,
    PreferenceStore, Preferences, SemanticMemoryStore,
};
