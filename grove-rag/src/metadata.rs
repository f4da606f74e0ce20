//! Ordered metadata records, parallel to the vector index.

use serde::{Deserialize, Serialize};

use crate::document::MetadataRecord;

/// Ordered collection of [`MetadataRecord`]s addressed by position.
///
/// Position `i` describes vector `i` of the corpus index. The store does not
/// enforce that pairing on its own; [`Corpus`](crate::Corpus) does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataStore {
    records: Vec<MetadataRecord>,
}

impl MetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records in order.
    pub fn extend(&mut self, records: impl IntoIterator<Item = MetadataRecord>) {
        self.records.extend(records);
    }

    /// The record at `position`.
    pub fn get(&self, position: usize) -> Option<&MetadataRecord> {
        self.records.get(position)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, MetadataRecord> {
        self.records.iter()
    }
}

impl From<Vec<MetadataRecord>> for MetadataStore {
    fn from(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }
}
