//! Recall orchestration: pick sources by mode, run them concurrently

use crate::retrieval::{RecallMode, SearchError};
use crate::store::{MetadataFilter, RecallSet, Store};

/// Resolved recall parameters for one request
#[derive(Debug, Clone)]
pub struct RecallPlan<'a> {
    pub query: &'a str,
    pub mode: RecallMode,
    pub vector_k: usize,
    pub metadata_filter: Option<&'a str>,
    pub metadata_k: usize,
}

/// Parse a `key=value` filter, splitting on the first `=`
///
/// Returns `None` for anything malformed: no `=`, or an empty key after
/// trimming. Range, prefix and boolean filters are not supported.
pub fn parse_metadata_filter(raw: &str) -> Option<MetadataFilter> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some(MetadataFilter::new(key, value.trim()))
}

/// Run the recall sources selected by `plan.mode`
///
/// Returns `(vector_set, metadata_set)`; a source that is not consulted
/// contributes an empty set.
pub async fn recall(
    store: &dyn Store,
    plan: &RecallPlan<'_>,
) -> Result<(RecallSet, RecallSet), SearchError> {
    if plan.query.is_empty() {
        return Err(SearchError::InvalidRequest(
            "Query text is required".to_string(),
        ));
    }

    let filter = if plan.mode.uses_metadata() {
        let parsed = plan.metadata_filter.and_then(parse_metadata_filter);
        if parsed.is_none() {
            if let Some(raw) = plan.metadata_filter.filter(|raw| !raw.is_empty()) {
                tracing::debug!("Skipping metadata recall, malformed filter '{}'", raw);
            }
        }
        parsed
    } else {
        None
    };

    let vector = async {
        if plan.mode.uses_vector() {
            store.vector_query(plan.query, plan.vector_k).await
        } else {
            Ok(Vec::new())
        }
    };

    let metadata = async {
        match &filter {
            Some(filter) => store.metadata_get(filter, plan.metadata_k).await,
            None => Ok(Vec::new()),
        }
    };

    let (vector_set, metadata_set) = tokio::join!(vector, metadata);

    Ok((vector_set?, metadata_set?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::{item, FakeStore};

    fn plan<'a>(mode: RecallMode, filter: Option<&'a str>) -> RecallPlan<'a> {
        RecallPlan {
            query: "RRC connection",
            mode,
            vector_k: 2,
            metadata_filter: filter,
            metadata_k: 2,
        }
    }

    fn store() -> FakeStore {
        FakeStore::new(
            vec![item("a", "A", "v"), item("b", "B", "v")],
            vec![item("b", "B", "m"), item("c", "C", "m")],
        )
    }

    #[test]
    fn test_parse_metadata_filter() {
        assert_eq!(
            parse_metadata_filter(" section_number = 5.3.5 "),
            Some(MetadataFilter::new("section_number", "5.3.5"))
        );
        // Only the first '=' separates
        assert_eq!(
            parse_metadata_filter("expr=a=b"),
            Some(MetadataFilter::new("expr", "a=b"))
        );
        assert_eq!(parse_metadata_filter("justakeyword"), None);
        assert_eq!(parse_metadata_filter(" =value"), None);
        assert_eq!(parse_metadata_filter(""), None);
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_store_call() {
        let store = store();
        let mut p = plan(RecallMode::Hybrid, Some("section_number=5.3.5"));
        p.query = "";

        let result = recall(&store, &p).await;

        assert!(matches!(result, Err(SearchError::InvalidRequest(_))));
        assert_eq!(store.vector_calls(), 0);
        assert!(store.metadata_calls().is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_runs_both_sources() {
        let store = store();
        let (vector, metadata) = recall(&store, &plan(RecallMode::Hybrid, Some("section_number=5.3.5")))
            .await
            .unwrap();

        assert_eq!(vector.len(), 2);
        assert_eq!(metadata.len(), 2);
        assert_eq!(
            store.metadata_calls(),
            vec![(MetadataFilter::new("section_number", "5.3.5"), 2)]
        );
    }

    #[tokio::test]
    async fn test_vector_mode_ignores_filter() {
        let store = store();
        let (vector, metadata) = recall(&store, &plan(RecallMode::Vector, Some("k=v")))
            .await
            .unwrap();

        assert_eq!(vector.len(), 2);
        assert!(metadata.is_empty());
        assert!(store.metadata_calls().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_mode_skips_vector() {
        let store = store();
        let (vector, metadata) = recall(&store, &plan(RecallMode::Metadata, Some("k=v")))
            .await
            .unwrap();

        assert!(vector.is_empty());
        assert_eq!(metadata.len(), 2);
        assert_eq!(store.vector_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_filter_skips_metadata_silently() {
        let store = store();
        let (vector, metadata) = recall(&store, &plan(RecallMode::Hybrid, Some("justakeyword")))
            .await
            .unwrap();

        assert_eq!(vector.len(), 2);
        assert!(metadata.is_empty());
        assert!(store.metadata_calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let mut store = store();
        store.fail = true;

        let result = recall(&store, &plan(RecallMode::Vector, None)).await;
        assert!(matches!(result, Err(SearchError::Store(_))));
    }
}
