//! Memory subsystem configuration

use crate::embeddings::{EmbeddingConfig, EmbeddingProviderType};
use crate::storage::MemoryStorageConfig;
use crate::vector_index::IndexConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tripmem_core::{Error, Result};

/// Configuration for the preference store and semantic memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding one preference file per user
    pub preference_dir: PathBuf,

    /// Semantic memory storage; `storage.path` is the memory directory
    pub storage: MemoryStorageConfig,

    /// Vector index tuning
    pub index: IndexConfig,

    /// Embedding provider
    pub embedding: EmbeddingConfig,

    /// Number of memories pulled into a context block
    pub default_top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            preference_dir: PathBuf::from("data"),
            storage: MemoryStorageConfig::new("data/memory"),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            default_top_k: 3,
        }
    }
}

impl MemoryConfig {
    /// Create config for testing under a temporary directory
    pub fn for_testing(root: &Path) -> Self {
        Self {
            preference_dir: root.join("preferences"),
            storage: MemoryStorageConfig::for_testing(&root.join("memory")),
            index: IndexConfig::small(),
            embedding: EmbeddingConfig::mock(64),
            default_top_k: 3,
        }
    }

    /// Read configuration from the environment
    ///
    /// - `PREFERENCE_DIR`: preference directory (default: `data`)
    /// - `MEMORY_DIR`: semantic memory directory (default: `data/memory`)
    /// - `EMBEDDING_PROVIDER`: `mock` or `openai` (default: `mock`)
    /// - `EMBEDDING_DIMENSIONS`: vector size of the mock provider (default: 384)
    /// - `OPENAI_API_KEY`: key for the `openai` provider
    /// - `MEMORY_TOP_K`: memories per context block (default: 3)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let preference_dir = lookup("PREFERENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.preference_dir);

        let storage = match lookup("MEMORY_DIR") {
            Some(dir) => MemoryStorageConfig::new(dir),
            None => defaults.storage,
        };

        let provider: EmbeddingProviderType = lookup("EMBEDDING_PROVIDER")
            .unwrap_or_else(|| "mock".to_string())
            .parse()
            .map_err(|e| Error::Configuration(format!("EMBEDDING_PROVIDER: {}", e)))?;

        let embedding = match provider {
            EmbeddingProviderType::Mock => {
                let dimensions = match lookup("EMBEDDING_DIMENSIONS") {
                    Some(raw) => parse_count("EMBEDDING_DIMENSIONS", &raw)?,
                    None => defaults.embedding.dimensions,
                };
                EmbeddingConfig::mock(dimensions)
            }
            EmbeddingProviderType::OpenAI => {
                let api_key = lookup("OPENAI_API_KEY").ok_or_else(|| {
                    Error::Configuration("OPENAI_API_KEY is required for the openai provider".to_string())
                })?;
                EmbeddingConfig::openai(&api_key)
            }
        };

        let default_top_k = match lookup("MEMORY_TOP_K") {
            Some(raw) => parse_count("MEMORY_TOP_K", &raw)?,
            None => defaults.default_top_k,
        };

        let config = Self {
            preference_dir,
            storage,
            index: defaults.index,
            embedding,
            default_top_k,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(Error::Configuration(
                "Embedding dimensions must be positive".to_string(),
            ));
        }
        self.index
            .validate()
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Builder: set the preference directory
    pub fn preference_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.preference_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Builder: set the semantic memory directory
    pub fn memory_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.storage.path = dir.as_ref().to_string_lossy().to_string();
        self
    }

    /// Builder: set the embedding provider
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    /// Builder: set the vector index configuration
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    /// Builder: set memories per context block
    pub fn default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }
}

fn parse_count(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} is not a number: {}", name, raw)))
}
