use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use tempfile::TempDir;

use kbrecall::ingest::{self, IngestError};
use kbrecall::store::{MetadataFilter, RecallSet, Store, StoreError, UpsertRecord};

/// Records the size of every upsert batch
#[derive(Default)]
struct BatchRecorder {
    batches: Mutex<Vec<Vec<String>>>,
}

impl BatchRecorder {
    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl Store for BatchRecorder {
    async fn vector_query(&self, _query_text: &str, _top_k: usize) -> Result<RecallSet, StoreError> {
        Ok(Vec::new())
    }

    async fn metadata_get(
        &self,
        _filter: &MetadataFilter,
        _limit: usize,
    ) -> Result<RecallSet, StoreError> {
        Ok(Vec::new())
    }

    async fn upsert(&self, batch: Vec<UpsertRecord>) -> Result<(), StoreError> {
        let ids = batch.into_iter().map(|r| r.id).collect();
        self.batches.lock().unwrap().push(ids);
        Ok(())
    }
}

fn chunks(prefix: &str, count: usize) -> serde_json::Value {
    let entries: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "id": format!("{}-{}", prefix, i),
                "embedding": [i as f64, 1.0],
                "document": format!("{} chunk {}", prefix, i),
                "metadata": {"source": prefix}
            })
        })
        .collect();
    json!(entries)
}

fn kb_with(files: &[(&str, serde_json::Value)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (name, content) in files {
        std::fs::write(temp.path().join(name), content.to_string()).unwrap();
    }
    temp
}

#[tokio::test]
async fn test_batches_span_files_in_order() {
    let kb = kb_with(&[("a.json", chunks("a", 3)), ("b.json", chunks("b", 2))]);
    let store = BatchRecorder::default();

    let summary = ingest::load_documents(
        &store,
        kb.path(),
        &["a.json".to_string(), "b.json".to_string()],
        2,
    )
    .await
    .unwrap();

    assert_eq!(summary.loaded, 5);
    assert_eq!(summary.batches, 3);
    assert_eq!(store.batch_sizes(), vec![2, 2, 1]);

    let batches = store.batches.lock().unwrap();
    assert_eq!(batches[0], vec!["a-0", "a-1"]);
    assert_eq!(batches[1], vec!["a-2", "b-0"]);
}

#[tokio::test]
async fn test_missing_file_writes_nothing() {
    let kb = kb_with(&[("a.json", chunks("a", 3))]);
    let store = BatchRecorder::default();

    let result = ingest::load_documents(
        &store,
        kb.path(),
        &["a.json".to_string(), "missing.json".to_string()],
        1000,
    )
    .await;

    match result {
        Err(IngestError::FileNotFound(name)) => assert_eq!(name, "missing.json"),
        other => panic!("expected FileNotFound, got {:?}", other),
    }
    assert!(store.batch_sizes().is_empty());
}

#[tokio::test]
async fn test_no_usable_entries_is_success() {
    let kb = kb_with(&[("empty.json", json!([{"document": "no id or vector"}]))]);
    let store = BatchRecorder::default();

    let summary = ingest::load_documents(&store, kb.path(), &["empty.json".to_string()], 1000)
        .await
        .unwrap();

    assert_eq!(summary.loaded, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        summary.message(),
        "No documents found in the specified files to load."
    );
    assert!(store.batch_sizes().is_empty());
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("broken.json"), "{not json").unwrap();
    let store = BatchRecorder::default();

    let result =
        ingest::load_documents(&store, temp.path(), &["broken.json".to_string()], 1000).await;
    assert!(matches!(result, Err(IngestError::Parse { .. })));
}

#[tokio::test]
async fn test_path_traversal_rejected() {
    let kb = kb_with(&[("a.json", chunks("a", 1))]);
    let store = BatchRecorder::default();

    let result = ingest::load_documents(
        &store,
        kb.path(),
        &["../a.json".to_string()],
        1000,
    )
    .await;
    assert!(matches!(result, Err(IngestError::InvalidRequest(_))));
}

#[test]
fn test_list_files_sorted_json_only() {
    let kb = kb_with(&[
        ("zeta.json", json!([])),
        ("alpha.json", json!([])),
        ("readme.md", json!("x")),
    ]);
    std::fs::create_dir(kb.path().join("nested.json")).unwrap();

    let files = ingest::list_files(kb.path()).unwrap();
    assert_eq!(files, vec!["alpha.json", "zeta.json"]);

    let missing = ingest::list_files(&kb.path().join("nope"));
    assert!(matches!(missing, Err(IngestError::KnowledgeBaseNotFound(_))));
}
