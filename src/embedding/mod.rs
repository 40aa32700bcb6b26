//! Query embedding
//!
//! Ingested documents arrive pre-embedded; only query text needs a vector at
//! search time. The provider must therefore match the model that produced the
//! knowledge-base files.
mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, HttpEmbeddingProvider};

use serde::{Deserialize, Serialize};

/// Configuration for the query embedding service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings URL
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Requested embedding dimension
    pub dimensions: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.siliconflow.cn/v1/embeddings".to_string(),
            model: "Qwen/Qwen3-Embedding-8B".to_string(),
            api_key_env: "SILICONFLOW_API_KEY".to_string(),
            dimensions: 1024,
            timeout_secs: 30,
        }
    }
}

/// Configuration for the HNSW vector index and store writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimension (must match embedding dimension)
    pub vector_dim: usize,
    /// HNSW construction parameter (higher = better recall, slower build)
    pub hnsw_ef_construction: usize,
    /// HNSW M parameter (number of connections per layer)
    pub hnsw_m: usize,
    /// HNSW search parameter
    pub hnsw_ef_search: usize,
    /// Expected collection size
    pub max_elements: usize,
    /// Records per store write; the store rejects larger batches
    pub upsert_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vector_dim: 1024,
            hnsw_ef_construction: 200,
            hnsw_m: 16,
            hnsw_ef_search: 64,
            max_elements: 100_000,
            upsert_batch_size: 1000,
        }
    }
}
