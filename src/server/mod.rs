//! HTTP search service

mod routes;
mod signals;

pub use routes::{ApiError, LoadRequest, LoadResponse};
pub use signals::SignalHandler;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::{KbRecallError, Result};
use crate::retrieval::HybridSearcher;

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<HybridSearcher>,
    pub knowledge_base_dir: PathBuf,
    pub upsert_batch_size: usize,
    /// Loads into one collection run one at a time
    pub load_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(
        searcher: Arc<HybridSearcher>,
        knowledge_base_dir: PathBuf,
        upsert_batch_size: usize,
    ) -> Self {
        Self {
            searcher,
            knowledge_base_dir,
            upsert_batch_size,
            load_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/", get(routes::status))
        .route("/list_files", get(routes::list_files))
        .route("/load_documents", post(routes::load_documents))
        .route("/search", post(routes::search))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until SIGINT or SIGTERM
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| KbRecallError::Io {
            source: e,
            context: format!("Failed to bind {}", addr),
        })?;

    let signals = SignalHandler::new()?;
    tracing::info!("kbrecall server listening on http://{}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let sig = signals.wait().await;
            tracing::info!("Shutting down on {}", sig);
        })
        .await
        .map_err(|e| KbRecallError::Io {
            source: e,
            context: "Server error".to_string(),
        })?;

    tracing::info!("Server stopped");
    Ok(())
}
