//! Embedding providers
//!
//! The semantic store only sees [`EmbeddingProvider`]. Anything that maps a
//! text to a vector of a fixed length, and does so deterministically for one
//! model version, can be injected: the hashed [`MockEmbeddingProvider`] for
//! offline use, a [`StaticEmbeddingProvider`] table for tests that need exact
//! geometry, or the OpenAI API behind the `openai` feature.

use crate::similarity::normalize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failures reported by an embedding provider
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The remote service answered with an error
    #[error("Embedding service error: {0}")]
    Service(String),

    #[error("Embedding service rate limit hit")]
    RateLimited,

    /// The provider cannot embed this text
    #[error("Cannot embed text: {0}")]
    InvalidInput(String),

    /// Missing configuration or compiled-out support
    #[error("Embedding provider unavailable: {0}")]
    NotConfigured(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The response could not be decoded
    #[error("Malformed embedding response: {0}")]
    Decode(String),

    /// The request never reached the service
    #[error("Embedding transport error: {0}")]
    Transport(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl From<EmbeddingError> for tripmem_core::Error {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::DimensionMismatch { expected, got } => {
                tripmem_core::Error::DimensionMismatch { expected, got }
            }
            other => tripmem_core::Error::Embedding(other.to_string()),
        }
    }
}

/// Which provider to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Hashed bag-of-words vectors, no network
    Mock,
    /// OpenAI embeddings endpoint
    OpenAI,
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> EmbeddingResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" => Ok(Self::OpenAI),
            other => Err(EmbeddingError::NotConfigured(format!(
                "unknown embedding provider '{}'",
                other
            ))),
        }
    }
}

/// Provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderType,

    /// Model identifier sent to the service
    pub model: String,

    /// Length of every vector the provider returns
    pub dimensions: usize,

    pub api_key: Option<String>,

    /// Endpoint root, e.g. a proxy or a compatible server
    pub api_base_url: Option<String>,

    /// Texts per request when embedding in bulk
    pub max_batch_size: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::mock(384)
    }
}

impl EmbeddingConfig {
    /// Offline hashed embeddings of `dimensions`
    pub fn mock(dimensions: usize) -> Self {
        Self {
            provider: EmbeddingProviderType::Mock,
            model: "hashed-bag-of-words".to_string(),
            dimensions,
            api_key: None,
            api_base_url: None,
            max_batch_size: 64,
            timeout_secs: 30,
        }
    }

    /// OpenAI `text-embedding-3-small` at its native 1536 dimensions
    pub fn openai(api_key: &str) -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key: Some(api_key.to_string()),
            api_base_url: None,
            max_batch_size: 64,
            timeout_secs: 30,
        }
    }
}

/// Maps text to a fixed-length vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every returned vector
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed many texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Offline provider
///
/// Every lower-cased alphanumeric word is hashed into a pseudo-random
/// direction; a text's vector is the normalized sum of its words, so texts
/// sharing words score close together. Identical on every platform.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        debug!("Mock embedding provider, {} dimensions", dimensions);
        Self { dimensions }
    }

    /// Add the direction of `word` into `acc`
    fn accumulate(word: &str, acc: &mut [f32]) {
        let mut state = xxhash_rust::xxh3::xxh3_64(word.as_bytes());
        for slot in acc.iter_mut() {
            // 64-bit LCG step (Knuth MMIX constants)
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *slot += ((state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32;
        }
    }

    fn vector_for(&self, text: &str) -> Option<Vec<f32>> {
        let mut acc = vec![0.0f32; self.dimensions];
        let mut words = 0;
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            Self::accumulate(&word.to_lowercase(), &mut acc);
            words += 1;
        }
        if words == 0 {
            return None;
        }
        normalize(&mut acc);
        Some(acc)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashed-bag-of-words"
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.vector_for(text)
            .ok_or_else(|| EmbeddingError::InvalidInput("text contains no words".to_string()))
    }
}

/// Provider backed by an explicit text → vector table
///
/// Unknown text is an error, which doubles as a way to simulate an outage.
/// Vectors are returned as given, even when their length disagrees with
/// `dimensions`.
pub struct StaticEmbeddingProvider {
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
}

impl StaticEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: HashMap::new(),
        }
    }

    /// Builder: map `text` to `vector`
    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "static-table"
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        match self.table.get(text) {
            Some(vector) => Ok(vector.clone()),
            None => Err(EmbeddingError::InvalidInput(format!("no vector for '{}'", text))),
        }
    }
}

/// OpenAI embeddings endpoint
#[cfg(feature = "openai")]
pub struct OpenAIEmbeddingProvider {
    config: EmbeddingConfig,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[cfg(feature = "openai")]
#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[cfg(feature = "openai")]
#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[cfg(feature = "openai")]
#[derive(Deserialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(feature = "openai")]
impl OpenAIEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| EmbeddingError::NotConfigured("OpenAI needs an API key".to_string()))?;

        let base = config
            .api_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/');
        let endpoint = format!("{}/embeddings", base);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        tracing::info!("OpenAI embeddings via {} ({})", endpoint, config.model);

        Ok(Self {
            config,
            api_key,
            endpoint,
            client,
        })
    }

    /// One request; vectors come back in input order
    async fn request(&self, input: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&OpenAIRequest {
                model: &self.config.model,
                input,
                dimensions: self.config.dimensions,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Service(format!("{}: {}", status, body)));
        }

        let mut parsed: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Decode(e.to_string()))?;

        if parsed.data.len() != input.len() {
            return Err(EmbeddingError::Decode(format!(
                "asked for {} vectors, got {}",
                input.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        parsed
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() == self.config.dimensions {
                    Ok(d.embedding)
                } else {
                    Err(EmbeddingError::DimensionMismatch {
                        expected: self.config.dimensions,
                        got: d.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        self.request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Decode("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.max_batch_size.max(1)) {
            out.extend(self.request(chunk).await?);
        }
        Ok(out)
    }
}

/// Build the provider named by `config`
pub fn create_provider(config: EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    if config.dimensions == 0 {
        return Err(EmbeddingError::NotConfigured(
            "embedding dimensions must be positive".to_string(),
        ));
    }

    match config.provider {
        EmbeddingProviderType::Mock => Ok(Arc::new(MockEmbeddingProvider::new(config.dimensions))),
        #[cfg(feature = "openai")]
        EmbeddingProviderType::OpenAI => Ok(Arc::new(OpenAIEmbeddingProvider::new(config)?)),
        #[cfg(not(feature = "openai"))]
        EmbeddingProviderType::OpenAI => Err(EmbeddingError::NotConfigured(
            "built without the `openai` feature".to_string(),
        )),
    }
}
