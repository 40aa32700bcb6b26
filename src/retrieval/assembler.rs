use serde::{Deserialize, Serialize};

use crate::store::{Metadata, RecallItem};

/// One search result as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document: String,
    pub metadata: Metadata,
}

impl From<RecallItem> for SearchHit {
    fn from(item: RecallItem) -> Self {
        Self {
            document: item.document,
            metadata: item.metadata,
        }
    }
}

/// Project recall items to hits, dropping the internal id and keeping order
pub fn assemble<I>(items: I) -> Vec<SearchHit>
where
    I: IntoIterator<Item = RecallItem>,
{
    items.into_iter().map(SearchHit::from).collect()
}
