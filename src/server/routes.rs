use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use super::AppState;
use crate::ingest::{self, IngestError};
use crate::retrieval::{SearchError, SearchHit, SearchRequest};

/// Handler error rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Search(SearchError),
    Ingest(IngestError),
    /// Body missing, not JSON, or the wrong shape
    Body(JsonRejection),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::Body(e)
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        Self::Search(e)
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        Self::Ingest(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Search(SearchError::InvalidRequest(_))
            | Self::Ingest(IngestError::InvalidRequest(_))
            | Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Ingest(IngestError::FileNotFound(_))
            | Self::Ingest(IngestError::KnowledgeBaseNotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Search(e) => e.to_string(),
            Self::Ingest(e) => e.to_string(),
            Self::Body(e) => format!("Invalid request body: {}", e.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!("{}", message);
        } else {
            tracing::debug!("Rejected request: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadRequest {
    #[serde(default)]
    pub filenames: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadResponse {
    pub message: String,
    pub loaded: usize,
    pub skipped: usize,
    pub batches: usize,
}

pub(super) async fn status() -> Json<serde_json::Value> {
    Json(json!({ "message": "kbrecall server is running" }))
}

pub(super) async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(ingest::list_files(&state.knowledge_base_dir)?))
}

pub(super) async fn load_documents(
    State(state): State<AppState>,
    body: Result<Json<LoadRequest>, JsonRejection>,
) -> Result<Json<LoadResponse>, ApiError> {
    let Json(body) = body?;
    let _guard = state.load_lock.lock().await;
    let summary = ingest::load_documents(
        state.searcher.store().as_ref(),
        &state.knowledge_base_dir,
        &body.filenames,
        state.upsert_batch_size,
    )
    .await?;

    Ok(Json(LoadResponse {
        message: summary.message(),
        loaded: summary.loaded,
        skipped: summary.skipped,
        batches: summary.batches,
    }))
}

pub(super) async fn search(
    State(state): State<AppState>,
    request: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let Json(request) = request?;
    let span = tracing::info_span!("search", request_id = %Uuid::new_v4());
    let hits = state.searcher.search(&request).instrument(span).await?;
    Ok(Json(hits))
}
