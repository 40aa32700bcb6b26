//! Hybrid retrieval & reranking
//!
//! A search recalls candidates from vector similarity and exact metadata match,
//! fuses the two sets (vector hits win on id collision), optionally reorders
//! the fused set through an external rerank service, and projects the result
//! to `{document, metadata}` pairs.

mod assembler;
mod fusion;
mod hybrid;
mod orchestrator;
mod reranker;

pub use assembler::{assemble, SearchHit};
pub use fusion::{fuse, FusedSet};
pub use hybrid::{HybridSearcher, RetrievalConfig};
pub use orchestrator::{parse_metadata_filter, recall, RecallPlan};
pub use reranker::{RerankClient, RerankConfig, RerankEntry, RerankRequest, RerankResponse};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Rerank service error: {0}")]
    RerankService(String),
}

/// Which recall sources a search consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecallMode {
    Vector,
    Metadata,
    #[default]
    Hybrid,
}

impl RecallMode {
    pub fn uses_vector(self) -> bool {
        matches!(self, Self::Vector | Self::Hybrid)
    }

    pub fn uses_metadata(self) -> bool {
        matches!(self, Self::Metadata | Self::Hybrid)
    }
}

impl FromStr for RecallMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vector" => Ok(Self::Vector),
            "metadata" => Ok(Self::Metadata),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(SearchError::InvalidRequest(format!(
                "Unknown recall_mode '{}', expected hybrid, vector or metadata",
                other
            ))),
        }
    }
}

impl fmt::Display for RecallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vector => "vector",
            Self::Metadata => "metadata",
            Self::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Search request as received on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text (required, non-empty)
    #[serde(default)]
    pub query: String,

    /// Vector recall size
    #[serde(
        default,
        deserialize_with = "count",
        skip_serializing_if = "Option::is_none"
    )]
    pub n_vector_results: Option<usize>,

    /// `key=value` metadata filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_keyword: Option<String>,

    /// Metadata recall size
    #[serde(
        default,
        deserialize_with = "count",
        skip_serializing_if = "Option::is_none"
    )]
    pub n_metadata_results: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_api_key: Option<String>,

    /// `hybrid` (default), `vector` or `metadata`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_mode: Option<String>,
}

/// Result count given as a JSON number or a numeric string (`2` or `"2"`)
fn count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(usize),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => Ok(Some(n)),
        Some(Count::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid result count '{}'", text))),
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Parsed recall mode, hybrid when absent
    pub fn mode(&self) -> Result<RecallMode, SearchError> {
        match self.recall_mode.as_deref() {
            None | Some("") => Ok(RecallMode::default()),
            Some(mode) => mode.parse(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::{Metadata, MetadataFilter, RecallItem, RecallSet, Store, UpsertRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn item(id: &str, document: &str, source: &str) -> RecallItem {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), source.to_string());
        RecallItem::new(id, document, metadata)
    }

    /// Store double with canned recall sets and call recording
    #[derive(Default)]
    pub struct FakeStore {
        pub vector: RecallSet,
        pub metadata: RecallSet,
        pub fail: bool,
        pub vector_calls: AtomicUsize,
        pub metadata_calls: Mutex<Vec<(MetadataFilter, usize)>>,
        pub vector_k: Mutex<Vec<usize>>,
    }

    impl FakeStore {
        pub fn new(vector: RecallSet, metadata: RecallSet) -> Self {
            Self {
                vector,
                metadata,
                ..Self::default()
            }
        }

        pub fn vector_calls(&self) -> usize {
            self.vector_calls.load(Ordering::SeqCst)
        }

        pub fn metadata_calls(&self) -> Vec<(MetadataFilter, usize)> {
            self.metadata_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn vector_query(
            &self,
            _query_text: &str,
            top_k: usize,
        ) -> Result<RecallSet, StoreError> {
            self.vector_calls.fetch_add(1, Ordering::SeqCst);
            self.vector_k.lock().unwrap().push(top_k);
            if self.fail {
                return Err(StoreError::Io(std::io::Error::other("backend down")));
            }
            Ok(self.vector.iter().take(top_k).cloned().collect())
        }

        async fn metadata_get(
            &self,
            filter: &MetadataFilter,
            limit: usize,
        ) -> Result<RecallSet, StoreError> {
            self.metadata_calls
                .lock()
                .unwrap()
                .push((filter.clone(), limit));
            Ok(self.metadata.iter().take(limit).cloned().collect())
        }

        async fn upsert(&self, _batch: Vec<UpsertRecord>) -> Result<(), StoreError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_counts_accept_numbers_and_numeric_strings() {
        let request: SearchRequest = serde_json::from_value(json!({
            "query": "q",
            "n_vector_results": 3,
            "n_metadata_results": " 4 "
        }))
        .unwrap();
        assert_eq!(request.n_vector_results, Some(3));
        assert_eq!(request.n_metadata_results, Some(4));

        let request: SearchRequest =
            serde_json::from_value(json!({"query": "q", "n_vector_results": null})).unwrap();
        assert_eq!(request.n_vector_results, None);
        assert_eq!(request.n_metadata_results, None);
    }

    #[test]
    fn test_request_counts_reject_non_numeric() {
        for bad in [json!("two"), json!(-1), json!(1.5), json!(true)] {
            let result: Result<SearchRequest, _> =
                serde_json::from_value(json!({"query": "q", "n_metadata_results": bad.clone()}));
            assert!(result.is_err(), "accepted {}", bad);
        }
    }
}
