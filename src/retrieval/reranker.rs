//! HTTP client for an external rerank service
//!
//! The payload is built from the fused set in order, so response entry
//! `index: i` always means `fused.as_slice()[i]`. Entries are resolved by that
//! position alone; document text is never matched back against the fused set.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retrieval::{FusedSet, SearchError};
use crate::store::RecallItem;

/// Rerank configuration; the model is fixed here and never taken from requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Model identifier sent with every rerank request
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            model: "Qwen/Qwen3-Reranker-8B".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Body sent to the rerank endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RerankRequest<'a> {
    pub model: &'a str,
    pub query: &'a str,
    pub documents: Vec<&'a str>,
}

/// One ranked entry; extra fields from the service are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct RerankEntry {
    /// Position in the request's `documents`
    pub index: usize,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

/// Response body; `results` order is the new rank order
#[derive(Debug, Clone, Deserialize)]
pub struct RerankResponse {
    #[serde(default)]
    pub results: Vec<RerankEntry>,
}

/// Rerank client shared across requests
#[derive(Clone)]
pub struct RerankClient {
    client: reqwest::Client,
    model: String,
}

impl RerankClient {
    pub fn new(config: &RerankConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::RerankService(format!("client setup failed: {}", e)))?;

        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    /// Reorder `fused` through the service at `endpoint`
    pub async fn rerank(
        &self,
        query: &str,
        fused: &FusedSet,
        endpoint: &str,
        api_key: &str,
    ) -> Result<Vec<RecallItem>, SearchError> {
        let candidates = fused.as_slice();
        let payload = RerankRequest {
            model: &self.model,
            query,
            documents: candidates.iter().map(|item| item.document.as_str()).collect(),
        };

        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SearchError::RerankService(format!("{} request failed: {}", endpoint, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::RerankService(format!(
                "{} returned {}: {}",
                endpoint, status, body
            )));
        }

        let response: RerankResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::RerankService(format!("invalid response body: {}", e)))?;

        let reordered = resolve(candidates, &response)?;
        tracing::debug!(
            "Reranked {} candidates into {} results with {}",
            candidates.len(),
            reordered.len(),
            self.model
        );

        Ok(reordered)
    }
}

/// Map response entries back onto the exact payload slice by position
fn resolve(
    candidates: &[RecallItem],
    response: &RerankResponse,
) -> Result<Vec<RecallItem>, SearchError> {
    response
        .results
        .iter()
        .map(|entry| {
            candidates.get(entry.index).cloned().ok_or_else(|| {
                SearchError::RerankService(format!(
                    "result index {} out of range for {} documents",
                    entry.index,
                    candidates.len()
                ))
            })
        })
        .collect()
}
