//! Hybrid search combining vector and metadata recall

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::retrieval::{
    assemble, fuse, recall, RecallPlan, RerankClient, RerankConfig, SearchError, SearchHit,
    SearchRequest,
};
use crate::store::Store;

/// Defaults applied when a request leaves recall sizes unset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_vector_results: usize,
    pub default_metadata_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_vector_results: 2,
            default_metadata_results: 2,
        }
    }
}

/// Request-scoped search pipeline over a shared store
pub struct HybridSearcher {
    store: Arc<dyn Store>,
    reranker: RerankClient,
    config: RetrievalConfig,
}

impl HybridSearcher {
    /// Create a new hybrid searcher
    pub fn new(
        store: Arc<dyn Store>,
        retrieval: RetrievalConfig,
        rerank: &RerankConfig,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            store,
            reranker: RerankClient::new(rerank)?,
            config: retrieval,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Perform hybrid search
    ///
    /// Any stage failure aborts the whole request. An empty recall is a
    /// successful empty result. A requested rerank that fails is an error,
    /// never a silent fall back to fusion order.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let mode = request.mode()?;

        let plan = RecallPlan {
            query: &request.query,
            mode,
            vector_k: request
                .n_vector_results
                .unwrap_or(self.config.default_vector_results),
            metadata_filter: request.metadata_keyword.as_deref(),
            metadata_k: request
                .n_metadata_results
                .unwrap_or(self.config.default_metadata_results),
        };

        // Step 1: Vector + metadata recall
        let (vector_set, metadata_set) = recall(self.store.as_ref(), &plan).await?;
        let (vector_count, metadata_count) = (vector_set.len(), metadata_set.len());

        // Step 2: Fusion
        let fused = fuse(vector_set, metadata_set);

        if fused.is_empty() {
            tracing::info!("Search ({}) recalled nothing", mode);
            return Ok(Vec::new());
        }

        // Step 3: Rerank if the caller supplied an endpoint and key
        let rerank_target = non_empty(request.rerank_url.as_deref())
            .zip(non_empty(request.rerank_api_key.as_deref()));

        let ordered = match rerank_target {
            Some((endpoint, api_key)) => {
                self.reranker
                    .rerank(&request.query, &fused, endpoint, api_key)
                    .await?
            }
            None => fused.into_vec(),
        };

        tracing::info!(
            "Search ({}): {} vector + {} metadata recalled, {} returned{}",
            mode,
            vector_count,
            metadata_count,
            ordered.len(),
            if rerank_target.is_some() { " after rerank" } else { "" }
        );

        // Step 4: Assemble
        Ok(assemble(ordered))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
