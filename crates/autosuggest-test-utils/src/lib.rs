//! Shared test utilities for all Autosuggest integration tests
//!
//! Provides a persistent Tokio runtime, fixture indexes, and an index wrapper
//! that slows down selected reads so deadline and locking behavior can be
//! observed.
//!
//! ## Usage
//!
//! In your test crate's `Cargo.toml`:
//! ```toml
//! [dev-dependencies]
//! autosuggest-test-utils = { path = "../autosuggest-test-utils" }
//! ```
//!
//! In your tests:
//! ```no_run
//! #[test]
//! fn my_integration_test() {
//!     autosuggest_test_utils::get_test_runtime().block_on(async {
//!         let project = autosuggest_test_utils::unique_project("ranking");
//!         // ... test logic ...
//!     })
//! }
//! ```

use autosuggest_common::{LogFormat, init_tracing};
use autosuggest_config::SuggesterConfig;
use autosuggest_index::{
    DocSet, IndexReader, IndexResult, MemoryIndex, PhraseQuery, PositionMap, Posting, Query,
    TermEntry,
};
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Shared Tokio runtime for ALL integration tests across ALL crates
///
/// Blocking rebuild work spawned by one test may outlive it; a single
/// long-lived runtime keeps those tasks from hitting a shut-down context.
static TEST_RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

/// Global counter for unique project names across ALL test crates
static PROJECT_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Get the shared test runtime (creates on first call, reuses thereafter)
///
/// **Configuration:**
/// - Workers default to CPU count
/// - Override with `TEST_RUNTIME_WORKERS` environment variable
///
/// # Panics
/// Panics if the runtime cannot be created (should never happen in normal conditions)
#[allow(clippy::expect_used)] // Test infrastructure - panic on init failure is acceptable
pub fn get_test_runtime() -> &'static tokio::runtime::Runtime {
    TEST_RUNTIME.get_or_init(|| {
        let workers = std::env::var("TEST_RUNTIME_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(std::num::NonZero::get)
                    .unwrap_or(4)
            });

        eprintln!(
            "🚀 Creating shared test runtime with {workers} workers (override with TEST_RUNTIME_WORKERS)"
        );

        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("test-runtime")
            .worker_threads(workers)
            .build()
            .expect("Failed to create test runtime")
    })
}

/// Unique project name, e.g. `ranking_3`
pub fn unique_project(prefix: &str) -> String {
    let counter = PROJECT_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}_{counter}")
}

/// Install a quiet subscriber; `RUST_LOG` turns on more output
pub fn init_test_tracing() {
    init_tracing(LogFormat::Compact, "warn");
}

/// Engine configuration storing its data under `dir`
pub fn test_config(dir: &Path) -> SuggesterConfig {
    SuggesterConfig {
        suggester_dir: dir.to_path_buf(),
        time_threshold_ms: 500,
        await_termination_secs: 30,
        ..SuggesterConfig::default()
    }
}

/// Ten documents: `apple` in all, `apply` in five, `april` in one
pub fn sample_index(generation: i64) -> MemoryIndex {
    let mut builder = MemoryIndex::builder().commit_generation(generation);
    for i in 0..10 {
        let mut words = String::from("fn apple");
        if i < 5 {
            words.push_str(" apply");
        }
        if i == 0 {
            words.push_str(" april");
        }
        builder.add_source(&format!("src/file{i}.rs"), &words);
    }
    builder.build()
}

/// Index wrapper sleeping before selected reads
#[derive(Debug, Clone)]
pub struct DelayedIndex<R> {
    inner: R,
    matching_delay: Duration,
    terms_delay: Duration,
}

impl<R: IndexReader> DelayedIndex<R> {
    /// Slow down query evaluation, as a large document scan would
    pub const fn on_matching(inner: R, delay: Duration) -> Self {
        Self {
            inner,
            matching_delay: delay,
            terms_delay: Duration::ZERO,
        }
    }

    /// Slow down the term dictionary, stretching automaton rebuilds
    pub const fn on_terms(inner: R, delay: Duration) -> Self {
        Self {
            inner,
            matching_delay: Duration::ZERO,
            terms_delay: delay,
        }
    }
}

impl<R: IndexReader> IndexReader for DelayedIndex<R> {
    fn fields(&self) -> Vec<String> {
        self.inner.fields()
    }

    fn num_docs(&self) -> u32 {
        self.inner.num_docs()
    }

    fn commit_generation(&self) -> i64 {
        self.inner.commit_generation()
    }

    fn terms(&self, field: &str) -> IndexResult<Vec<TermEntry>> {
        std::thread::sleep(self.terms_delay);
        self.inner.terms(field)
    }

    fn postings(&self, field: &str, term: &str) -> IndexResult<Vec<Posting>> {
        self.inner.postings(field, term)
    }

    fn matching_documents(&self, query: &Query) -> IndexResult<DocSet> {
        std::thread::sleep(self.matching_delay);
        self.inner.matching_documents(query)
    }

    fn suggest_positions(&self, phrase: &PhraseQuery, docs: &DocSet) -> IndexResult<PositionMap> {
        self.inner.suggest_positions(phrase, docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosuggest_index::FULL_FIELD;

    #[test]
    fn test_runtime_is_reusable() {
        let rt1 = get_test_runtime();
        let rt2 = get_test_runtime();

        // Should be same instance
        assert!(std::ptr::eq(rt1, rt2));
    }

    #[test]
    fn test_project_names_are_unique() {
        assert_ne!(unique_project("p"), unique_project("p"));
    }

    #[test]
    fn test_sample_index_frequencies() {
        let index = sample_index(1);
        let terms = index.terms(FULL_FIELD).unwrap();
        let freq = |text: &str| terms.iter().find(|t| t.text == text).map(|t| t.doc_freq);

        assert_eq!(index.num_docs(), 10);
        assert_eq!(freq("apple"), Some(10));
        assert_eq!(freq("apply"), Some(5));
        assert_eq!(freq("april"), Some(1));
    }

    #[test]
    fn test_delayed_index_waits() {
        let index = DelayedIndex::on_matching(sample_index(1), Duration::from_millis(20));
        let started = std::time::Instant::now();
        let docs = index.matching_documents(&Query::MatchAll).unwrap();

        assert_eq!(docs.len(), 10);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
