//! Store adapter: the capability interface over a vector + metadata store
//!
//! Recall never talks to a concrete database. It receives an `Arc<dyn Store>`,
//! which lets tests swap in doubles and lets one process serve several
//! collections side by side.

mod sqlite;
mod vector_index;

pub use sqlite::SqliteStore;
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Flat string metadata attached to every stored document
pub type Metadata = BTreeMap<String, String>;

/// Ordered recall output of a single source
pub type RecallSet = Vec<RecallItem>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A single document returned by recall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallItem {
    /// Store-wide unique id
    pub id: String,
    /// Document text
    pub document: String,
    /// Exact-match metadata
    pub metadata: Metadata,
}

impl RecallItem {
    pub fn new(id: impl Into<String>, document: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            metadata,
        }
    }
}

/// Single-key equality filter for metadata recall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One document to write, with its precomputed embedding
#[derive(Debug, Clone)]
pub struct UpsertRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: Metadata,
}

/// Capability interface over a vector + metadata store
#[async_trait]
pub trait Store: Send + Sync {
    /// Similarity search, most similar first
    async fn vector_query(&self, query_text: &str, top_k: usize) -> Result<RecallSet, StoreError>;

    /// Exact match on one metadata key, at most `limit` items
    async fn metadata_get(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<RecallSet, StoreError>;

    /// Insert or overwrite by id
    async fn upsert(&self, batch: Vec<UpsertRecord>) -> Result<(), StoreError>;
}
