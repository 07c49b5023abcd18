//! Merging suggestions that arrive from several shards

use crate::{SuggesterError, SuggesterResult};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// A suggested completion and the shards it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResultItem {
    pub phrase: String,
    pub projects: BTreeSet<String>,
    pub score: i64,
}

impl LookupResultItem {
    pub fn new(phrase: impl Into<String>, project: impl Into<String>, score: i64) -> Self {
        Self {
            phrase: phrase.into(),
            projects: BTreeSet::from([project.into()]),
            score,
        }
    }

    /// Add the score and projects of `other`
    ///
    /// # Errors
    /// Returns `SuggesterError::PhraseMismatch` if the phrases differ
    pub fn combine(&mut self, other: Self) -> SuggesterResult<()> {
        if self.phrase != other.phrase {
            return Err(SuggesterError::PhraseMismatch {
                left: self.phrase.clone(),
                right: other.phrase,
            });
        }
        self.score = self.score.saturating_add(other.score);
        self.projects.extend(other.projects);
        Ok(())
    }
}

// "Greater" ranks first: higher score, then smaller phrase
impl Ord for LookupResultItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.phrase.cmp(&self.phrase))
            .then_with(|| self.projects.cmp(&other.projects))
    }
}

impl PartialOrd for LookupResultItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded queue keeping the best `capacity` items
#[derive(Debug)]
pub struct LookupPriorityQueue {
    capacity: usize,
    heap: BinaryHeap<Reverse<LookupResultItem>>,
}

impl LookupPriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1)),
        }
    }

    /// Whether an item with `score` could enter the queue
    pub fn can_insert(&self, score: i64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        self.heap.len() < self.capacity
            || self
                .heap
                .peek()
                .is_some_and(|Reverse(worst)| score >= worst.score)
    }

    pub fn insert(&mut self, item: LookupResultItem) {
        if self.capacity == 0 {
            return;
        }
        self.heap.push(Reverse(item));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Items best first
    pub fn into_sorted(self) -> Vec<LookupResultItem> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(item)| item)
            .collect()
    }
}

/// Merge items with the same phrase and keep the best `limit`
///
/// Items meet through [`LookupResultItem::combine`]. Equal scores rank by phrase.
pub fn combine_results(
    items: impl IntoIterator<Item = LookupResultItem>,
    limit: usize,
) -> Vec<LookupResultItem> {
    let mut by_phrase: HashMap<String, LookupResultItem> = HashMap::new();
    for item in items {
        match by_phrase.entry(item.phrase.clone()) {
            Entry::Occupied(mut existing) => {
                if let Err(e) = existing.get_mut().combine(item) {
                    tracing::warn!(error = %e, "Dropping suggestion that could not be merged");
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
        }
    }

    let mut queue = LookupPriorityQueue::new(limit);
    for item in by_phrase.into_values() {
        queue.insert(item);
    }
    queue.into_sorted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_sums_scores_and_unions_projects() {
        let mut item = LookupResultItem::new("malloc", "kernel", 10);
        item.combine(LookupResultItem::new("malloc", "libc", 5)).unwrap();
        item.combine(LookupResultItem::new("malloc", "kernel", 1)).unwrap();

        assert_eq!(item.score, 16);
        assert_eq!(
            item.projects.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["kernel", "libc"]
        );
    }

    #[test]
    fn test_combine_rejects_other_phrases() {
        let mut item = LookupResultItem::new("malloc", "kernel", 10);
        let result = item.combine(LookupResultItem::new("calloc", "kernel", 10));
        assert!(matches!(result, Err(SuggesterError::PhraseMismatch { .. })));
        assert_eq!(item.score, 10);
    }

    #[test]
    fn test_combine_results_merges_and_truncates() {
        let items = vec![
            LookupResultItem::new("b", "p1", 5),
            LookupResultItem::new("a", "p1", 3),
            LookupResultItem::new("c", "p2", 7),
            LookupResultItem::new("a", "p2", 3),
        ];

        let merged = combine_results(items, 2);
        let phrases: Vec<_> = merged.iter().map(|i| i.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["c", "a"]);
        assert_eq!(merged.get(1).map(|i| i.projects.len()), Some(2));
    }

    #[test]
    fn test_combine_results_saturates_scores() {
        let items = vec![
            LookupResultItem::new("malloc", "kernel", i64::MAX),
            LookupResultItem::new("malloc", "libc", 1),
        ];

        let merged = combine_results(items, 5);
        assert_eq!(merged.len(), 1);
        let malloc = merged.first().unwrap();
        assert_eq!(malloc.score, i64::MAX);
        assert_eq!(malloc.projects.len(), 2);
    }

    #[test]
    fn test_equal_scores_rank_by_phrase() {
        let items = vec![
            LookupResultItem::new("zeta", "p", 1),
            LookupResultItem::new("alpha", "p", 1),
            LookupResultItem::new("mu", "p", 1),
        ];
        let phrases: Vec<_> = combine_results(items, 3)
            .into_iter()
            .map(|i| i.phrase)
            .collect();
        assert_eq!(phrases, vec!["alpha", "mu", "zeta"]);
    }

    #[test]
    fn test_queue_rejects_low_scores_when_full() {
        let mut queue = LookupPriorityQueue::new(1);
        assert!(queue.can_insert(0));
        queue.insert(LookupResultItem::new("x", "p", 4));
        assert!(!queue.can_insert(3));
        assert!(queue.can_insert(4));
        assert!(!LookupPriorityQueue::new(0).can_insert(100));
    }
}
