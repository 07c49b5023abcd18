//! Read-side abstraction over a term/postings index

use crate::eval;
use crate::query::{PhraseQuery, Query};
use crate::IndexResult;
use std::collections::{BTreeSet, HashMap};

/// Document identifier, dense in `0..num_docs`
pub type DocId = u32;

/// Allowed positions of the completed term, per matching document
pub type PositionMap = HashMap<DocId, BTreeSet<u32>>;

/// Dictionary entry of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermEntry {
    pub text: String,
    pub doc_freq: u32,
}

/// Occurrences of a term in one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc: DocId,
    pub positions: Vec<u32>,
}

/// Set of document ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocSet(BTreeSet<DocId>);

impl DocSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document of an index with `num_docs` documents
    pub fn all(num_docs: u32) -> Self {
        Self((0..num_docs).collect())
    }

    pub fn insert(&mut self, doc: DocId) -> bool {
        self.0.insert(doc)
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.0.contains(&doc)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DocId> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).copied().collect())
    }
}

impl FromIterator<DocId> for DocSet {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Read access to an index generation
///
/// Implementations must be cheap to share across threads; the suggester
/// holds them behind `Arc` and calls them from blocking worker threads.
pub trait IndexReader: Send + Sync {
    /// Indexed field names
    fn fields(&self) -> Vec<String>;

    /// Number of live documents
    fn num_docs(&self) -> u32;

    /// Monotonic counter that changes whenever the index is committed
    fn commit_generation(&self) -> i64;

    /// Term dictionary of `field`, ordered by term text
    ///
    /// # Errors
    /// Returns `IndexError::UnknownField` if the field is not indexed
    fn terms(&self, field: &str) -> IndexResult<Vec<TermEntry>>;

    /// Postings of `term` in `field`, ordered by document; empty when absent
    ///
    /// # Errors
    /// Returns implementation-specific read errors
    fn postings(&self, field: &str, term: &str) -> IndexResult<Vec<Posting>>;

    fn has_field(&self, field: &str) -> bool {
        self.fields().iter().any(|f| f == field)
    }

    /// Documents matching `query`
    ///
    /// # Errors
    /// Returns read errors from [`IndexReader::postings`]
    fn matching_documents(&self, query: &Query) -> IndexResult<DocSet> {
        eval::matching_documents(self, query)
    }

    /// Positions the completed term may take inside `phrase`, for each of `docs`
    ///
    /// # Errors
    /// Returns read errors from [`IndexReader::postings`]
    fn suggest_positions(&self, phrase: &PhraseQuery, docs: &DocSet) -> IndexResult<PositionMap> {
        eval::suggest_positions(self, phrase, docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_set_operations() {
        let a: DocSet = [1, 2, 3].into_iter().collect();
        let b: DocSet = [2, 3, 4].into_iter().collect();

        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(a.union(&b).len(), 4);
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(DocSet::all(3).iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
