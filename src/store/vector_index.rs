//! HNSW vector index for similarity search
use hnsw_rs::prelude::*;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// hnsw_rs caps the layer count at 16
const MAX_LAYER: usize = 16;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index lock poisoned")]
    Poisoned,
}

/// Search result with document id and similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Document id
    pub id: String,
    /// Cosine similarity (higher is more similar)
    pub score: f32,
}

struct Inner {
    hnsw: Hnsw<'static, f32, DistCosine>,
    slot_to_id: HashMap<usize, String>,
    id_to_slot: HashMap<String, usize>,
    next_slot: usize,
}

impl Inner {
    fn insert(&mut self, id: &str, data: Vec<f32>) {
        if let Some(stale) = self.id_to_slot.remove(id) {
            self.slot_to_id.remove(&stale);
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.hnsw.insert((&data, slot));
        self.slot_to_id.insert(slot, id.to_string());
        self.id_to_slot.insert(id.to_string(), slot);
    }
}

/// HNSW vector index keyed by document id
///
/// HNSW graphs cannot delete points, so overwriting an id inserts the new
/// vector under a fresh slot and masks the old slot out of search results.
pub struct VectorIndex {
    inner: RwLock<Inner>,
    dimension: usize,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    max_elements: usize,
}

impl VectorIndex {
    /// Create an empty index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match the ingested embeddings)
    /// * `m` - HNSW M parameter (connections per layer)
    /// * `ef_construction` - HNSW construction parameter
    /// * `ef_search` - HNSW search parameter
    /// * `max_elements` - Expected number of vectors, used to size the layers
    pub fn new(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        max_elements: usize,
    ) -> Self {
        Self {
            inner: RwLock::new(Self::empty_inner(m, ef_construction, max_elements)),
            dimension,
            m,
            ef_construction,
            ef_search,
            max_elements,
        }
    }

    fn empty_inner(m: usize, ef_construction: usize, max_elements: usize) -> Inner {
        Inner {
            hnsw: Hnsw::<f32, DistCosine>::new(
                m,
                max_elements,
                MAX_LAYER,
                ef_construction,
                DistCosine,
            ),
            slot_to_id: HashMap::new(),
            id_to_slot: HashMap::new(),
            next_slot: 0,
        }
    }

    /// Insert or overwrite the vector for `id`
    pub fn upsert(&self, id: &str, vector: &[f32]) -> Result<(), VectorIndexError> {
        self.check_dimension(vector)?;

        let data = vector.to_vec();
        let mut inner = self.inner.write().map_err(|_| VectorIndexError::Poisoned)?;
        inner.insert(id, data);

        Ok(())
    }

    /// Replace the whole index with `entries`, returning the number indexed
    ///
    /// The new graph is built off to the side; searches keep using the old
    /// one until the swap.
    pub fn replace_all<I>(&self, entries: I) -> Result<usize, VectorIndexError>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut fresh = Self::empty_inner(self.m, self.ef_construction, self.max_elements);
        for (id, vector) in entries {
            self.check_dimension(&vector)?;
            fresh.insert(&id, vector);
        }

        let count = fresh.id_to_slot.len();
        let mut inner = self.inner.write().map_err(|_| VectorIndexError::Poisoned)?;
        *inner = fresh;

        Ok(count)
    }

    /// Search for the `k` nearest live vectors, most similar first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;

        let inner = self.inner.read().map_err(|_| VectorIndexError::Poisoned)?;
        if k == 0 || inner.id_to_slot.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch by the number of masked slots so stale hits cannot crowd out live ones
        let stale = inner.next_slot - inner.id_to_slot.len();
        let knbn = k.saturating_add(stale).min(inner.next_slot);
        let ef = self.ef_search.max(knbn);

        let results = inner
            .hnsw
            .search(query, knbn, ef)
            .into_iter()
            .filter_map(|neighbour| {
                inner
                    .slot_to_id
                    .get(&neighbour.d_id)
                    .map(|id| SearchResult {
                        id: id.clone(),
                        score: 1.0 - neighbour.distance,
                    })
            })
            .take(k)
            .collect();

        Ok(results)
    }

    /// Number of live vectors
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.id_to_slot.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(dim: usize, hot: &[(usize, f32)]) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        for (i, x) in hot {
            v[*i] = *x;
        }
        v
    }

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);

        index.upsert("a", &axis(8, &[(0, 1.0)])).unwrap();
        index.upsert("b", &axis(8, &[(1, 1.0)])).unwrap();
        index.upsert("c", &axis(8, &[(0, 0.9), (1, 0.1)])).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&axis(8, &[(0, 1.0)]), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert!(results[0].score > 0.99);
    }

    #[test]
    fn test_overwrite_masks_stale_vector() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);

        index.upsert("a", &axis(8, &[(0, 1.0)])).unwrap();
        index.upsert("b", &axis(8, &[(1, 1.0)])).unwrap();
        // Move "a" away from axis 0
        index.upsert("a", &axis(8, &[(2, 1.0)])).unwrap();

        assert_eq!(index.len(), 2);

        let results = index.search(&axis(8, &[(2, 1.0)]), 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > 0.99);
        // "a" must appear once, from its live slot only
        assert_eq!(results.iter().filter(|r| r.id == "a").count(), 1);
    }

    #[test]
    fn test_unbounded_k_after_overwrite() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);

        index.upsert("a", &axis(8, &[(0, 1.0)])).unwrap();
        index.upsert("a", &axis(8, &[(0, 1.0), (1, 0.2)])).unwrap();
        index.upsert("b", &axis(8, &[(1, 1.0)])).unwrap();

        let results = index.search(&axis(8, &[(0, 1.0)]), usize::MAX).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_replace_all_swaps_contents() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);
        index.upsert("old", &axis(8, &[(0, 1.0)])).unwrap();

        let count = index
            .replace_all(vec![
                ("a".to_string(), axis(8, &[(1, 1.0)])),
                ("b".to_string(), axis(8, &[(2, 1.0)])),
            ])
            .unwrap();

        assert_eq!(count, 2);
        let ids: Vec<String> = index
            .search(&axis(8, &[(0, 1.0), (1, 0.5)]), 5)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids[0], "a");
        assert!(!ids.contains(&"old".to_string()));
    }

    #[test]
    fn test_replace_all_rejects_bad_dimension() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);
        index.upsert("keep", &axis(8, &[(0, 1.0)])).unwrap();

        let result = index.replace_all(vec![("bad".to_string(), vec![1.0; 3])]);
        assert!(result.is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_empty_and_zero_k() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);
        assert!(index.search(&axis(8, &[(0, 1.0)]), 3).unwrap().is_empty());

        index.upsert("a", &axis(8, &[(0, 1.0)])).unwrap();
        assert!(index.search(&axis(8, &[(0, 1.0)]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_validation() {
        let index = VectorIndex::new(8, 16, 200, 64, 1000);

        let result = index.upsert("a", &[1.0; 4]);
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 8,
                actual: 4
            })
        ));
        assert!(index.search(&[1.0; 3], 1).is_err());
    }
}
