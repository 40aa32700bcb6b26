//! Knowledge-base listing and JSON batch ingestion
//!
//! Knowledge-base files are JSON arrays of pre-embedded chunks. Two layouts
//! are accepted: `{id, embedding, document, metadata}` and the older
//! `{vector, text, metadata: {chunk_id, ..}}`.

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::{Metadata, Store, StoreError, UpsertRecord};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Knowledge base directory not found: {0}")]
    KnowledgeBaseNotFound(PathBuf),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Failed to parse {file}: {source}")]
    Parse {
        file: String,
        source: serde_json::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of a load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub files: Vec<String>,
    pub loaded: usize,
    pub skipped: usize,
    pub batches: usize,
}

impl LoadSummary {
    /// Human-readable outcome
    pub fn message(&self) -> String {
        if self.loaded == 0 {
            "No documents found in the specified files to load.".to_string()
        } else {
            format!(
                "Successfully loaded documents from {}.",
                self.files.join(", ")
            )
        }
    }
}

/// List `*.json` files in the knowledge-base directory, sorted by name
pub fn list_files(kb_dir: &Path) -> Result<Vec<String>, IngestError> {
    if !kb_dir.is_dir() {
        return Err(IngestError::KnowledgeBaseNotFound(kb_dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(kb_dir).map_err(|e| IngestError::Io {
        source: e,
        context: format!("Failed to read {:?}", kb_dir),
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::Io {
            source: e,
            context: format!("Failed to read entry in {:?}", kb_dir),
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

/// Load the named knowledge-base files into `store`
///
/// Every file is checked for existence before anything is written. Records
/// are upserted in chunks of `batch_size`.
pub async fn load_documents(
    store: &dyn Store,
    kb_dir: &Path,
    filenames: &[String],
    batch_size: usize,
) -> Result<LoadSummary, IngestError> {
    if filenames.is_empty() {
        return Err(IngestError::InvalidRequest(
            "No filenames provided.".to_string(),
        ));
    }
    if batch_size == 0 {
        return Err(IngestError::InvalidRequest(
            "Batch size must be greater than 0".to_string(),
        ));
    }

    let mut paths = Vec::with_capacity(filenames.len());
    for name in filenames {
        paths.push((name, resolve_file(kb_dir, name)?));
    }

    let mut records = Vec::new();
    let mut skipped = 0;
    for (name, path) in &paths {
        let content = std::fs::read_to_string(path).map_err(|e| IngestError::Io {
            source: e,
            context: format!("Failed to read {}", name),
        })?;
        let entries: Vec<Value> =
            serde_json::from_str(&content).map_err(|e| IngestError::Parse {
                file: name.to_string(),
                source: e,
            })?;

        let before = records.len();
        for entry in &entries {
            match parse_entry(entry) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        tracing::debug!("{}: {} usable entries", name, records.len() - before);
    }

    let mut summary = LoadSummary {
        files: filenames.to_vec(),
        loaded: records.len(),
        skipped,
        batches: 0,
    };

    if records.is_empty() {
        tracing::info!("No documents found in {}", filenames.join(", "));
        return Ok(summary);
    }

    for (i, chunk) in records.chunks(batch_size).enumerate() {
        store.upsert(chunk.to_vec()).await?;
        summary.batches += 1;
        tracing::info!("Upserted batch {} with {} documents", i + 1, chunk.len());
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} malformed entries", skipped);
    }

    Ok(summary)
}

fn resolve_file(kb_dir: &Path, name: &str) -> Result<PathBuf, IngestError> {
    let is_plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != "..";
    if !is_plain {
        return Err(IngestError::InvalidRequest(format!(
            "Invalid filename: {}",
            name
        )));
    }

    let path = kb_dir.join(name);
    if !path.is_file() {
        return Err(IngestError::FileNotFound(name.to_string()));
    }
    Ok(path)
}

/// Build an upsert record, or `None` when id, embedding or text is missing
fn parse_entry(entry: &Value) -> Option<UpsertRecord> {
    let raw_metadata = entry.get("metadata").and_then(Value::as_object);

    let id = non_empty_str(entry.get("id"))
        .or_else(|| non_empty_str(raw_metadata.and_then(|m| m.get("chunk_id"))))?;

    let embedding: Vec<f32> = entry
        .get("embedding")
        .or_else(|| entry.get("vector"))
        .and_then(Value::as_array)
        .filter(|values| !values.is_empty())?
        .iter()
        .map(|v| v.as_f64().map(|x| x as f32))
        .collect::<Option<_>>()?;

    // Zero-norm and non-finite vectors are malformed
    if embedding.iter().all(|x| *x == 0.0) || embedding.iter().any(|x| !x.is_finite()) {
        return None;
    }

    let document = non_empty_str(entry.get("document"))
        .or_else(|| non_empty_str(entry.get("text")))?;

    let metadata = raw_metadata
        .map(|m| {
            m.iter()
                .map(|(key, value)| (key.clone(), flatten_value(value)))
                .collect::<Metadata>()
        })
        .unwrap_or_default();

    Some(UpsertRecord {
        id: id.to_string(),
        embedding,
        document: document.to_string(),
        metadata,
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Metadata is matched as strings; scalars keep their plain text form
fn flatten_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
