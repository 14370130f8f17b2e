//! Memory façade
//!
//! Composes the preference store and semantic memory into the plain-text
//! interface a prompt layer consumes. Both stores are built once and shared;
//! the façade holds no state of its own.

use crate::config::MemoryConfig;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::exchange::MemoryExchange;
use crate::preferences::{PreferenceStore, Preferences};
use crate::semantic::SemanticMemoryStore;
use std::sync::Arc;
use tracing::info;
use tripmem_core::{EntryId, Error, Result, Timestamp};

/// Entry point for reading and writing user memory
#[derive(Clone)]
pub struct MemoryFacade {
    preferences: Arc<PreferenceStore>,
    memory: Arc<SemanticMemoryStore>,
    default_top_k: usize,
}

impl MemoryFacade {
    /// Wrap existing stores
    pub fn new(preferences: Arc<PreferenceStore>, memory: Arc<SemanticMemoryStore>) -> Self {
        Self {
            preferences,
            memory,
            default_top_k: MemoryConfig::default().default_top_k,
        }
    }

    /// Open both stores from configuration
    pub fn open(config: &MemoryConfig) -> Result<Self> {
        let provider = create_provider(config.embedding.clone())
            .map_err(|e| Error::Configuration(format!("Failed to create embedding provider: {}", e)))?;
        Self::open_with_provider(config, provider)
    }

    /// Open both stores with an explicit embedding provider
    pub fn open_with_provider(config: &MemoryConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;

        let preferences = PreferenceStore::open(&config.preference_dir)?;
        let memory = SemanticMemoryStore::open(config.storage.clone(), config.index.clone(), provider)?;

        info!(
            "Memory ready: preferences at {}, semantic memory at {}",
            config.preference_dir.display(),
            config.storage.path
        );

        Ok(Self {
            preferences: Arc::new(preferences),
            memory: Arc::new(memory),
            default_top_k: config.default_top_k,
        })
    }

    /// Builder: set memories per context block
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// Get the preference store
    pub fn preference_store(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    /// Get the semantic memory store
    pub fn memory_store(&self) -> &Arc<SemanticMemoryStore> {
        &self.memory
    }

    /// Export/import over the semantic memory store
    pub fn exchange(&self) -> MemoryExchange {
        MemoryExchange::new(Arc::clone(&self.memory))
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    // ==================== Preferences ====================

    pub fn preferences(&self, user_id: &str) -> Preferences {
        self.preferences.load(user_id)
    }

    pub fn update_preference(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        self.preferences.update(user_id, key, value)
    }

    pub fn format_preferences(&self, user_id: &str) -> String {
        self.preferences.format_for_context(user_id)
    }

    // ==================== Semantic memory ====================

    /// Record a new memory for `user_id`
    pub async fn remember(&self, user_id: &str, text: &str, reply: Option<&str>) -> Result<EntryId> {
        self.memory.append(user_id, text, reply).await
    }

    /// Payloads of the memories most similar to `text`
    pub async fn recall(&self, text: &str, top_k: usize, since: Option<Timestamp>) -> Result<Vec<String>> {
        self.memory.query(text, top_k, since).await
    }

    /// Bulleted block of the memories most similar to `text`
    pub async fn related_memories(
        &self,
        text: &str,
        top_k: usize,
        since: Option<Timestamp>,
    ) -> Result<String> {
        self.memory.format_snippets(text, top_k, since).await
    }

    /// Remove every memory of `user_id`; preferences are kept
    pub fn forget(&self, user_id: &str) -> Result<usize> {
        self.memory.forget(user_id)
    }

    /// Remove every memory and the preference record of `user_id`
    pub fn forget_user_completely(&self, user_id: &str) -> Result<usize> {
        let removed = self.memory.forget(user_id)?;
        self.preferences.remove_user(user_id)?;
        info!("Erased all stored data for {}", user_id);
        Ok(removed)
    }

    // ==================== Context ====================

    /// Preferences and related memories as one block of text
    ///
    /// ```text
    /// User preferences:
    /// Budget: mid
    ///
    /// Related memories:
    /// - Trip to Rome
    /// ```
    pub async fn build_context(
        &self,
        user_id: &str,
        query: &str,
        top_k: Option<usize>,
        since: Option<Timestamp>,
    ) -> Result<String> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let preferences = self.format_preferences(user_id);
        let memories = self.related_memories(query, top_k, since).await?;

        Ok(format!(
            "User preferences:\n{}\n\nRelated memories:\n{}",
            preferences, memories
        ))
    }
}
