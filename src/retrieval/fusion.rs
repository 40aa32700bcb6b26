//! Order-preserving, first-insert-wins fusion of recall sets

use ahash::AHashSet;

use crate::store::RecallItem;

/// Insertion-ordered collection of recall items, unique by id
///
/// The item kept for an id is the first one inserted; later items with the
/// same id are dropped.
#[derive(Debug, Clone, Default)]
pub struct FusedSet {
    items: Vec<RecallItem>,
    seen: AHashSet<String>,
}

// `seen` is derived from `items`
impl PartialEq for FusedSet {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for FusedSet {}

impl FusedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item` unless its id is already present; returns whether it was added
    pub fn insert(&mut self, item: RecallItem) -> bool {
        if self.seen.insert(item.id.clone()) {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<&RecallItem> {
        if !self.seen.contains(id) {
            return None;
        }
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in insertion order; position `i` is stable for the life of the set
    pub fn as_slice(&self) -> &[RecallItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecallItem> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<RecallItem> {
        self.items
    }
}

impl Extend<RecallItem> for FusedSet {
    fn extend<I: IntoIterator<Item = RecallItem>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl FromIterator<RecallItem> for FusedSet {
    fn from_iter<I: IntoIterator<Item = RecallItem>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for FusedSet {
    type Item = RecallItem;
    type IntoIter = std::vec::IntoIter<RecallItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Merge vector and metadata recall into one deduplicated set
///
/// Vector items go in first, in rank order, so they win on id collision.
/// Metadata-only items follow in their source order.
pub fn fuse<V, M>(vector_set: V, metadata_set: M) -> FusedSet
where
    V: IntoIterator<Item = RecallItem>,
    M: IntoIterator<Item = RecallItem>,
{
    let mut fused = FusedSet::new();
    fused.extend(vector_set);

    let before = fused.len();
    fused.extend(metadata_set);
    tracing::debug!(
        "Fused {} vector hits with {} metadata-only additions",
        before,
        fused.len() - before
    );

    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::item;

    fn ids(set: &FusedSet) -> Vec<&str> {
        set.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn test_vector_wins_on_collision() {
        let vector = vec![item("a", "A", "vector"), item("b", "B-vec", "vector")];
        let metadata = vec![item("b", "B-meta", "metadata"), item("c", "C", "metadata")];

        let fused = fuse(vector, metadata);

        assert_eq!(ids(&fused), vec!["a", "b", "c"]);
        let b = fused.get("b").unwrap();
        assert_eq!(b.document, "B-vec");
        assert_eq!(b.metadata["source"], "vector");
    }

    #[test]
    fn test_empty_inputs() {
        let fused = fuse(Vec::new(), Vec::new());
        assert!(fused.is_empty());
        assert_eq!(fused, FusedSet::new());
    }

    #[test]
    fn test_single_source_order_preserved() {
        let vector = vec![item("z", "", "v"), item("a", "", "v"), item("m", "", "v")];
        assert_eq!(ids(&fuse(vector, Vec::new())), vec!["z", "a", "m"]);

        let metadata = vec![item("q", "", "m"), item("b", "", "m")];
        assert_eq!(ids(&fuse(Vec::new(), metadata)), vec!["q", "b"]);
    }

    #[test]
    fn test_duplicates_within_one_source_keep_first() {
        let vector = vec![item("a", "first", "v"), item("a", "second", "v")];
        let fused = fuse(vector, Vec::new());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused.get("a").unwrap().document, "first");
    }

    #[test]
    fn test_refusing_is_identity() {
        let vector = vec![item("a", "A", "v"), item("b", "B", "v")];
        let metadata = vec![item("b", "B2", "m"), item("c", "C", "m")];

        let once = fuse(vector, metadata);
        let twice = fuse(once.clone(), Vec::new());

        assert_eq!(once, twice);
    }
}
