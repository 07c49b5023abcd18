//! Persistent search counts per field
//!
//! Counts live in a `DashMap` so increments only need the shard read lock.
//! Two JSON files back each store: the counts and the sizing config.

use crate::automaton::CompletionAutomaton;
use crate::{SuggesterError, SuggesterResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

const COUNTS_SUFFIX: &str = "_search_count.json";
const CONFIG_SUFFIX: &str = "_search_count.cfg.json";

/// Sizing of a popularity store, persisted next to the counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub entries: u64,
    pub average_key_size: f64,
}

/// Term -> search count map for one field of one shard
#[derive(Debug)]
pub struct PopularityStore {
    field: String,
    counts_path: PathBuf,
    config_path: PathBuf,
    config: StoreConfig,
    counts: DashMap<String, u64>,
    dirty: AtomicBool,
    // Concurrent flushes share the temp file
    flush_lock: Mutex<()>,
}

impl PopularityStore {
    /// Open the store for `field` in `dir`, creating it when absent
    ///
    /// An existing store smaller than `entries` is resized.
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` or `SuggesterError::CorruptData` when
    /// existing files cannot be read
    pub fn open(
        dir: &Path,
        field: &str,
        entries: u64,
        average_key_size: f64,
    ) -> SuggesterResult<Self> {
        if let Some(mut store) = Self::open_existing(dir, field)? {
            if store.config.entries < entries {
                store.resize(entries, average_key_size)?;
            }
            return Ok(store);
        }

        let store = Self::empty(
            dir,
            field,
            StoreConfig {
                entries,
                average_key_size,
            },
        );
        store.write_config()?;
        tracing::debug!(field, entries, "Created popularity store");
        Ok(store)
    }

    /// Open a previously created store; `None` when it was never created
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` or `SuggesterError::CorruptData` when
    /// existing files cannot be read
    pub fn open_existing(dir: &Path, field: &str) -> SuggesterResult<Option<Self>> {
        let config_path = dir.join(format!("{field}{CONFIG_SUFFIX}"));
        if !config_path.exists() {
            return Ok(None);
        }

        let config: StoreConfig = serde_json::from_slice(&std::fs::read(&config_path)?)?;
        let store = Self::empty(dir, field, config);

        if store.counts_path.exists() {
            let counts: BTreeMap<String, u64> =
                serde_json::from_slice(&std::fs::read(&store.counts_path)?)?;
            for (term, count) in counts {
                store.counts.insert(term, count);
            }
        }

        tracing::debug!(field, terms = store.counts.len(), "Loaded popularity store");
        Ok(Some(store))
    }

    /// Discard any persisted data and start over with `entries` capacity
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` if the files cannot be replaced
    pub fn recreate(
        dir: &Path,
        field: &str,
        entries: u64,
        average_key_size: f64,
    ) -> SuggesterResult<Self> {
        let store = Self::empty(
            dir,
            field,
            StoreConfig {
                entries,
                average_key_size,
            },
        );
        if store.counts_path.exists() {
            std::fs::remove_file(&store.counts_path)?;
        }
        store.write_config()?;
        Ok(store)
    }

    fn empty(dir: &Path, field: &str, config: StoreConfig) -> Self {
        Self {
            field: field.to_string(),
            counts_path: dir.join(format!("{field}{COUNTS_SUFFIX}")),
            config_path: dir.join(format!("{field}{CONFIG_SUFFIX}")),
            config,
            counts: DashMap::new(),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub const fn config(&self) -> StoreConfig {
        self.config
    }

    /// Recorded count of `term`, 0 when never searched
    pub fn get(&self, term: &str) -> u64 {
        self.counts.get(term).map_or(0, |count| *count)
    }

    /// Number of terms with a recorded count
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Add `delta` to the count of `term` and return the new count
    ///
    /// # Errors
    /// Returns `SuggesterError::UnknownTerm` if `automaton` does not contain
    /// the term, or `SuggesterError::CapacityExceeded` if a new term would
    /// not fit
    pub fn increment(
        &self,
        term: &str,
        delta: u64,
        automaton: &CompletionAutomaton,
    ) -> SuggesterResult<u64> {
        if !automaton.contains(term) {
            return Err(SuggesterError::UnknownTerm {
                field: self.field.clone(),
                term: term.to_string(),
            });
        }
        if delta == 0 {
            return Ok(self.get(term));
        }

        // len() locks every map shard; check before taking the entry lock
        let full = u64::try_from(self.counts.len()).unwrap_or(u64::MAX) >= self.config.entries;
        if full && !self.counts.contains_key(term) {
            return Err(SuggesterError::CapacityExceeded {
                field: self.field.clone(),
                capacity: self.config.entries,
            });
        }

        let mut count = self.counts.entry(term.to_string()).or_insert(0);
        *count = count.saturating_add(delta);
        let updated = *count;
        drop(count);

        self.dirty.store(true, Ordering::Release);
        Ok(updated)
    }

    /// Terms ordered by count descending, ties by term ascending
    pub fn top_by_popularity(&self, page: usize, page_size: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        entries
            .into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .collect()
    }

    /// Grow capacity; shrinking is ignored
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` if the config cannot be written
    pub fn resize(&mut self, entries: u64, average_key_size: f64) -> SuggesterResult<()> {
        if entries <= self.config.entries {
            return Ok(());
        }
        tracing::debug!(
            field = %self.field,
            from = self.config.entries,
            to = entries,
            "Resizing popularity store"
        );
        self.config = StoreConfig {
            entries,
            average_key_size,
        };
        self.write_config()
    }

    /// Drop counts of terms the automaton no longer contains
    ///
    /// Returns the number of removed terms.
    pub fn retain_known(&self, automaton: &CompletionAutomaton) -> usize {
        let before = self.counts.len();
        self.counts.retain(|term, _| automaton.contains(term));
        let removed = before.saturating_sub(self.counts.len());
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Persist the counts if they changed since the last flush
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` if the counts cannot be written
    pub fn flush(&self) -> SuggesterResult<()> {
        let _writing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot: BTreeMap<String, u64> = self
            .counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let result = write_json(&self.counts_path, &snapshot);
        if result.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        result
    }

    fn write_config(&self) -> SuggesterResult<()> {
        write_json(&self.config_path, &self.config)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> SuggesterResult<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn automaton() -> CompletionAutomaton {
        CompletionAutomaton::build(
            ["alpha", "beta", "gamma", "delta"]
                .into_iter()
                .map(|t| (t.to_string(), 1)),
        )
        .unwrap()
    }

    #[test]
    fn test_increment_known_terms() {
        let dir = tempfile::tempdir().unwrap();
        let store = PopularityStore::open(dir.path(), "full", 10, 5.0).unwrap();
        let automaton = automaton();

        assert_eq!(store.increment("alpha", 2, &automaton).unwrap(), 2);
        assert_eq!(store.increment("alpha", 3, &automaton).unwrap(), 5);
        assert_eq!(store.get("alpha"), 5);
        assert_eq!(store.get("beta"), 0);
    }

    #[test]
    fn test_unknown_term_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PopularityStore::open(dir.path(), "full", 10, 5.0).unwrap();

        let result = store.increment("omega", 1, &automaton());
        assert!(matches!(result, Err(SuggesterError::UnknownTerm { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_limits_new_terms_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PopularityStore::open(dir.path(), "full", 1, 5.0).unwrap();
        let automaton = automaton();

        store.increment("alpha", 1, &automaton).unwrap();
        assert!(matches!(
            store.increment("beta", 1, &automaton),
            Err(SuggesterError::CapacityExceeded { capacity: 1, .. })
        ));
        assert_eq!(store.increment("alpha", 1, &automaton).unwrap(), 2);

        store.resize(4, 5.0).unwrap();
        assert_eq!(store.increment("beta", 1, &automaton).unwrap(), 1);
    }

    #[test]
    fn test_top_by_popularity_pages() {
        let dir = tempfile::tempdir().unwrap();
        let store = PopularityStore::open(dir.path(), "full", 10, 5.0).unwrap();
        let automaton = automaton();
        store.increment("gamma", 3, &automaton).unwrap();
        store.increment("beta", 1, &automaton).unwrap();
        store.increment("alpha", 3, &automaton).unwrap();

        assert_eq!(
            store.top_by_popularity(0, 2),
            vec![("alpha".to_string(), 3), ("gamma".to_string(), 3)]
        );
        assert_eq!(store.top_by_popularity(1, 2), vec![("beta".to_string(), 1)]);
        assert!(store.top_by_popularity(2, 2).is_empty());
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let automaton = automaton();
        {
            let store = PopularityStore::open(dir.path(), "full", 10, 5.0).unwrap();
            store.increment("delta", 4, &automaton).unwrap();
            store.flush().unwrap();
        }

        let reopened = PopularityStore::open_existing(dir.path(), "full")
            .unwrap()
            .unwrap();
        assert_eq!(reopened.get("delta"), 4);
        assert_eq!(reopened.config().entries, 10);
        assert!(dir.path().join("full_search_count.json").exists());
        assert!(dir.path().join("full_search_count.cfg.json").exists());
    }

    #[test]
    fn test_concurrent_flushes_leave_readable_counts() {
        let dir = tempfile::tempdir().unwrap();
        let automaton = automaton();
        let store = PopularityStore::open(dir.path(), "full", 10, 5.0).unwrap();

        std::thread::scope(|scope| {
            for term in ["alpha", "beta", "gamma", "delta"] {
                let store = &store;
                let automaton = &automaton;
                scope.spawn(move || {
                    for _ in 0..25 {
                        store.increment(term, 1, automaton).unwrap();
                        store.flush().unwrap();
                    }
                });
            }
        });

        let reopened = PopularityStore::open_existing(dir.path(), "full")
            .unwrap()
            .unwrap();
        for term in ["alpha", "beta", "gamma", "delta"] {
            assert_eq!(reopened.get(term), 25);
        }
    }

    #[test]
    fn test_open_grows_smaller_store() {
        let dir = tempfile::tempdir().unwrap();
        PopularityStore::open(dir.path(), "full", 2, 5.0).unwrap();

        let store = PopularityStore::open(dir.path(), "full", 8, 6.0).unwrap();
        assert_eq!(store.config().entries, 8);
        assert!(PopularityStore::open_existing(dir.path(), "defs").unwrap().is_none());
    }

    #[test]
    fn test_retain_known_drops_vanished_terms() {
        let dir = tempfile::tempdir().unwrap();
        let store = PopularityStore::open(dir.path(), "full", 10, 5.0).unwrap();
        store.increment("alpha", 1, &automaton()).unwrap();
        store.increment("beta", 1, &automaton()).unwrap();

        let shrunk =
            CompletionAutomaton::build([("alpha".to_string(), 1)]).unwrap();
        assert_eq!(store.retain_known(&shrunk), 1);
        assert_eq!(store.get("beta"), 0);
        assert_eq!(store.get("alpha"), 1);
    }

    #[test]
    fn test_corrupt_counts_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        PopularityStore::open(dir.path(), "full", 2, 5.0).unwrap();
        std::fs::write(dir.path().join("full_search_count.json"), "{not json").unwrap();

        assert!(matches!(
            PopularityStore::open_existing(dir.path(), "full"),
            Err(SuggesterError::CorruptData(_))
        ));
        let fresh = PopularityStore::recreate(dir.path(), "full", 2, 5.0).unwrap();
        assert!(fresh.is_empty());
    }
}
