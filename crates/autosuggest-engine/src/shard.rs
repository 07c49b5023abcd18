//! Completion data of one project
//!
//! Readers (lookups, complex searches, popularity increments) share a tokio
//! `RwLock`; init and rebuild take it exclusively for the whole rebuild, so a
//! search either sees the previous data or skips the shard.

use crate::automaton::{AVERAGE_LENGTH_DEFAULT, CompletionAutomaton, Suggestion};
use crate::popularity::PopularityStore;
use crate::{SuggesterError, SuggesterResult};
use autosuggest_index::IndexReader;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tokio_util::sync::CancellationToken;

const VERSION_FILE: &str = "version.txt";
const AUTOMATON_EXTENSION: &str = "fst";

/// Lifecycle of a shard: `Uninitialized -> Initializing -> Ready <-> Rebuilding`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    Uninitialized,
    Initializing,
    Ready,
    Rebuilding,
}

impl ShardState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Initializing => 1,
            Self::Ready => 2,
            Self::Rebuilding => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Rebuilding,
            _ => Self::Uninitialized,
        }
    }
}

#[derive(Debug, Default)]
struct ShardInner {
    automatons: HashMap<String, CompletionAutomaton>,
    popularity: HashMap<String, PopularityStore>,
    average_lengths: HashMap<String, f64>,
    commit_generation: i64,
}

/// Automatons and popularity stores of one shard
#[derive(Debug)]
pub struct ShardData {
    name: String,
    dir: PathBuf,
    fields: BTreeSet<String>,
    allow_most_popular: bool,
    state: AtomicU8,
    inner: Arc<RwLock<ShardInner>>,
    /// Cancelled by `remove` or engine shutdown; stops lifecycle work
    cancel: CancellationToken,
}

impl ShardData {
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        fields: BTreeSet<String>,
        allow_most_popular: bool,
    ) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            fields,
            allow_most_popular,
            state: AtomicU8::new(ShardState::Uninitialized.as_u8()),
            inner: Arc::new(RwLock::new(ShardInner::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// Tie lifecycle work to `cancel`, usually a child of the engine's token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether the shard was removed or its engine is shutting down
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn state(&self) -> ShardState {
        ShardState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ShardState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state(), ShardState::Ready | ShardState::Rebuilding)
    }

    /// Load persisted data for the reader's generation, or build it
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` if the shard directory cannot be created,
    /// `SuggesterError::Terminated` once the shard is cancelled and
    /// `SuggesterError::TaskFailed` if the blocking worker panics
    #[tracing::instrument(skip_all, fields(shard = %self.name))]
    pub async fn init(self: &Arc<Self>, reader: Arc<dyn IndexReader>) -> SuggesterResult<()> {
        self.set_state(ShardState::Initializing);
        let mut guard = Arc::clone(&self.inner).write_owned().await;
        if self.cancel.is_cancelled() {
            tracing::debug!("Shard cancelled, skipping init");
            self.set_state(ShardState::Uninitialized);
            return Err(SuggesterError::Terminated);
        }
        let shard = Arc::clone(self);

        let result =
            tokio::task::spawn_blocking(move || shard.init_blocking(&mut guard, reader.as_ref()))
                .await
                .map_err(SuggesterError::from)
                .and_then(|r| r);

        match &result {
            _ if self.cancel.is_cancelled() => self.set_state(ShardState::Uninitialized),
            Ok(()) => self.set_state(ShardState::Ready),
            Err(e) => {
                tracing::error!(error = %e, "Shard initialization failed");
                self.set_state(ShardState::Uninitialized);
            }
        }
        result
    }

    /// Rebuild every field from the live term dictionary
    ///
    /// Field failures are logged and leave that field's previous data in place.
    /// Cancellation stops the rebuild between fields.
    ///
    /// # Errors
    /// Returns `SuggesterError::Terminated` once the shard is cancelled and
    /// `SuggesterError::TaskFailed` if the blocking worker panics
    #[tracing::instrument(skip_all, fields(shard = %self.name))]
    pub async fn rebuild(self: &Arc<Self>, reader: Arc<dyn IndexReader>) -> SuggesterResult<()> {
        let previous = self.state();
        self.set_state(ShardState::Rebuilding);
        let mut guard = Arc::clone(&self.inner).write_owned().await;
        if self.cancel.is_cancelled() {
            tracing::debug!("Shard cancelled, skipping rebuild");
            self.set_state(ShardState::Uninitialized);
            return Err(SuggesterError::Terminated);
        }
        let shard = Arc::clone(self);

        let result =
            tokio::task::spawn_blocking(move || shard.rebuild_blocking(&mut guard, reader.as_ref()))
                .await
                .map_err(SuggesterError::from)
                .and_then(|r| r);

        match &result {
            _ if self.cancel.is_cancelled() => self.set_state(ShardState::Uninitialized),
            Ok(()) => self.set_state(ShardState::Ready),
            Err(e) => {
                tracing::error!(error = %e, "Shard rebuild failed");
                let restored = if previous == ShardState::Uninitialized {
                    ShardState::Uninitialized
                } else {
                    ShardState::Ready
                };
                self.set_state(restored);
            }
        }
        result
    }

    fn init_blocking(
        &self,
        inner: &mut ShardInner,
        reader: &dyn IndexReader,
    ) -> SuggesterResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let generation = reader.commit_generation();

        // Existing counts feed the weights of a fresh build
        if self.allow_most_popular {
            for field in &self.fields {
                match PopularityStore::open_existing(&self.dir, field) {
                    Ok(Some(store)) => {
                        inner.popularity.insert(field.clone(), store);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(field = %field, error = %e, "Discarding unreadable popularity data");
                    }
                }
            }
        }

        let stored = self.stored_generation();
        if stored == Some(generation) {
            tracing::debug!(generation, "Loading stored suggester data");
            for field in &self.fields {
                self.check_cancelled(inner)?;
                match CompletionAutomaton::load(&self.automaton_path(field)) {
                    Ok(automaton) => {
                        let average = automaton.stats().average_term_length();
                        inner.average_lengths.insert(field.clone(), average);
                        inner.automatons.insert(field.clone(), automaton);
                    }
                    Err(e) => {
                        tracing::warn!(field = %field, error = %e, "Stored automaton unusable, rebuilding field");
                        self.log_field_failure(field, self.rebuild_field(inner, reader, field));
                    }
                }
            }
        } else {
            tracing::info!(?stored, generation, "Building suggester data");
            for field in &self.fields {
                self.check_cancelled(inner)?;
                self.log_field_failure(field, self.rebuild_field(inner, reader, field));
            }
        }

        inner.commit_generation = generation;
        if self.allow_most_popular {
            for field in &self.fields {
                self.reconcile_popularity(inner, field, false);
            }
        }
        self.write_generation(generation)?;
        // Store failures are logged and stay dirty for the next flush
        let _ = self.flush_stores(inner);

        tracing::info!(fields = inner.automatons.len(), "Shard initialized");
        Ok(())
    }

    fn rebuild_blocking(
        &self,
        inner: &mut ShardInner,
        reader: &dyn IndexReader,
    ) -> SuggesterResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let generation = reader.commit_generation();
        let generation_changed = generation != inner.commit_generation;

        for field in &self.fields {
            self.check_cancelled(inner)?;
            let rebuilt = self.rebuild_field(inner, reader, field);
            if rebuilt.is_ok() && self.allow_most_popular {
                self.reconcile_popularity(inner, field, generation_changed);
            }
            self.log_field_failure(field, rebuilt);
        }

        inner.commit_generation = generation;
        self.write_generation(generation)?;
        // Store failures are logged and stay dirty for the next flush
        let _ = self.flush_stores(inner);

        tracing::info!(generation, "Shard rebuilt");
        Ok(())
    }

    /// Build, persist, then swap in the automaton of one field
    fn rebuild_field(
        &self,
        inner: &mut ShardInner,
        reader: &dyn IndexReader,
        field: &str,
    ) -> SuggesterResult<()> {
        let popularity = inner.popularity.get(field);
        let (automaton, stats) = CompletionAutomaton::build_from_index(reader, field, |term| {
            popularity.map_or(0, |store| store.get(term))
        })?;
        automaton.persist(&self.automaton_path(field))?;

        tracing::debug!(field, terms = stats.term_count, "Built automaton");
        inner
            .average_lengths
            .insert(field.to_string(), stats.average_term_length());
        inner.automatons.insert(field.to_string(), automaton);
        Ok(())
    }

    /// Open or resize the popularity store of `field` to fit its automaton
    fn reconcile_popularity(&self, inner: &mut ShardInner, field: &str, remove_vanished: bool) {
        let Some(automaton) = inner.automatons.get(field) else {
            return;
        };
        let entries = u64::try_from(automaton.len()).unwrap_or(u64::MAX);
        if entries == 0 {
            return;
        }
        let average = inner
            .average_lengths
            .get(field)
            .copied()
            .unwrap_or(AVERAGE_LENGTH_DEFAULT);

        if let Some(store) = inner.popularity.get_mut(field) {
            if remove_vanished {
                let removed = store.retain_known(automaton);
                tracing::debug!(field, removed, "Removed counts of vanished terms");
            }
            if let Err(e) = store.resize(entries, average) {
                tracing::warn!(field, error = %e, "Could not resize popularity store");
            }
            return;
        }

        let store = PopularityStore::open(&self.dir, field, entries, average).or_else(|e| {
            tracing::warn!(field, error = %e, "Recreating popularity store");
            PopularityStore::recreate(&self.dir, field, entries, average)
        });
        match store {
            Ok(store) => {
                inner.popularity.insert(field.to_string(), store);
            }
            Err(e) => tracing::error!(field, error = %e, "Popularity tracking unavailable"),
        }
    }

    /// Stop between fields once cancelled, keeping the counts gathered so far
    fn check_cancelled(&self, inner: &ShardInner) -> SuggesterResult<()> {
        if self.cancel.is_cancelled() {
            tracing::debug!(shard = %self.name, "Stopping lifecycle work, shard cancelled");
            let _ = self.flush_stores(inner);
            return Err(SuggesterError::Terminated);
        }
        Ok(())
    }

    fn log_field_failure(&self, field: &str, result: SuggesterResult<()>) {
        if let Err(e) = result {
            tracing::error!(shard = %self.name, field, error = %e, "Could not build automaton");
        }
    }

    fn automaton_path(&self, field: &str) -> PathBuf {
        self.dir.join(format!("{field}.{AUTOMATON_EXTENSION}"))
    }

    fn stored_generation(&self) -> Option<i64> {
        std::fs::read_to_string(self.dir.join(VERSION_FILE))
            .ok()
            .and_then(|text| text.trim().parse().ok())
    }

    fn write_generation(&self, generation: i64) -> SuggesterResult<()> {
        std::fs::write(self.dir.join(VERSION_FILE), generation.to_string())?;
        Ok(())
    }

    /// Shared access without waiting; `None` while uninitialized or rebuilding
    pub fn try_read(&self) -> Option<ShardReadGuard> {
        if !self.is_initialized() {
            return None;
        }
        Arc::clone(&self.inner)
            .try_read_owned()
            .ok()
            .map(|guard| ShardReadGuard { guard })
    }

    /// Add `value` to the search count of `term`
    ///
    /// Returns `false` when the shard is busy (and `wait` is off) or does not
    /// track popularity for `field`.
    ///
    /// # Errors
    /// Returns `SuggesterError::UnknownTerm` or `SuggesterError::CapacityExceeded`
    pub async fn increment_search_count(
        &self,
        field: &str,
        term: &str,
        value: u64,
        wait: bool,
    ) -> SuggesterResult<bool> {
        if !self.allow_most_popular {
            return Ok(false);
        }
        let guard = if wait {
            Arc::clone(&self.inner).read_owned().await
        } else {
            match Arc::clone(&self.inner).try_read_owned() {
                Ok(guard) => guard,
                Err(_) => return Ok(false),
            }
        };

        let (Some(automaton), Some(store)) = (guard.automatons.get(field), guard.popularity.get(field))
        else {
            return Ok(false);
        };
        store.increment(term, value, automaton)?;
        Ok(true)
    }

    /// A page of the most searched terms of `field`
    pub async fn popularity_data(&self, field: &str, page: usize, page_size: usize) -> Vec<(String, u64)> {
        let inner = self.inner.read().await;
        inner
            .popularity
            .get(field)
            .map(|store| store.top_by_popularity(page, page_size))
            .unwrap_or_default()
    }

    /// Persist changed popularity counts
    ///
    /// # Errors
    /// Returns the first write failure; every store is still attempted
    pub async fn flush(&self) -> SuggesterResult<()> {
        let inner = self.inner.read().await;
        self.flush_stores(&inner)
    }

    /// Persist changed counts unless lifecycle work holds the shard
    ///
    /// Returns `false` when busy; init and rebuild flush once they finish.
    ///
    /// # Errors
    /// Returns the first write failure
    pub fn try_flush(&self) -> SuggesterResult<bool> {
        match self.inner.try_read() {
            Ok(inner) => self.flush_stores(&inner).map(|()| true),
            Err(_) => Ok(false),
        }
    }

    fn flush_stores(&self, inner: &ShardInner) -> SuggesterResult<()> {
        let mut first_error = None;
        for store in inner.popularity.values() {
            if let Err(e) = store.flush() {
                tracing::warn!(shard = %self.name, field = store.field(), error = %e, "Could not flush popularity store");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drop all data and delete the shard directory
    ///
    /// Later `init` and `rebuild` calls fail with `SuggesterError::Terminated`.
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` if the directory cannot be deleted
    pub async fn remove(&self) -> SuggesterResult<()> {
        // Queued or running lifecycle work must not recreate the directory
        self.cancel.cancel();
        let mut inner = Arc::clone(&self.inner).write_owned().await;
        *inner = ShardInner::default();
        self.set_state(ShardState::Uninitialized);

        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> SuggesterResult<()> {
            let _held = inner;
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            Ok(())
        })
        .await?
    }
}

/// Shared access to a shard's data; the read lock is released on drop
#[derive(Debug)]
pub struct ShardReadGuard {
    guard: OwnedRwLockReadGuard<ShardInner>,
}

impl ShardReadGuard {
    /// Automaton prefix lookup; empty when the field has no automaton
    pub fn lookup(&self, field: &str, prefix: &str, limit: usize) -> Vec<Suggestion> {
        self.guard
            .automatons
            .get(field)
            .map(|automaton| automaton.lookup(prefix, limit))
            .unwrap_or_default()
    }

    pub fn automaton(&self, field: &str) -> Option<&CompletionAutomaton> {
        self.guard.automatons.get(field)
    }

    /// Recorded search count; 0 without popularity tracking
    pub fn popularity_count(&self, field: &str, term: &str) -> u64 {
        self.guard
            .popularity
            .get(field)
            .map_or(0, |store| store.get(term))
    }

    pub fn commit_generation(&self) -> i64 {
        self.guard.commit_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosuggest_index::{FULL_FIELD, MemoryIndex};

    fn index(generation: i64, extra: &str) -> Arc<dyn IndexReader> {
        let mut builder = MemoryIndex::builder().commit_generation(generation);
        builder.add_source("a.c", "apple apple apply");
        builder.add_source("b.c", "apple april");
        builder.add_source("c.c", extra);
        Arc::new(builder.build())
    }

    fn shard(dir: &Path, popular: bool) -> Arc<ShardData> {
        Arc::new(ShardData::new(
            "demo",
            dir.join("demo"),
            BTreeSet::from([FULL_FIELD.to_string()]),
            popular,
        ))
    }

    fn lookup(shard: &ShardData, prefix: &str) -> Vec<String> {
        shard
            .try_read()
            .unwrap()
            .lookup(FULL_FIELD, prefix, 10)
            .into_iter()
            .map(|s| s.term)
            .collect()
    }

    #[tokio::test]
    async fn test_init_builds_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        assert!(shard.try_read().is_none());

        shard.init(index(3, "apricot")).await.unwrap();

        assert_eq!(shard.state(), ShardState::Ready);
        assert_eq!(lookup(&shard, "ap"), vec!["apple", "apply", "apricot", "april"]);
        let shard_dir = dir.path().join("demo");
        assert!(shard_dir.join("full.fst").exists());
        assert!(shard_dir.join("full_search_count.cfg.json").exists());
        assert_eq!(std::fs::read_to_string(shard_dir.join("version.txt")).unwrap(), "3");
    }

    #[tokio::test]
    async fn test_init_with_matching_generation_loads_stored_data() {
        let dir = tempfile::tempdir().unwrap();
        shard(dir.path(), false).init(index(5, "apricot")).await.unwrap();

        // Same generation, different content: the stored automaton wins
        let reopened = shard(dir.path(), false);
        reopened.init(index(5, "apex")).await.unwrap();
        assert!(lookup(&reopened, "ap").contains(&"apricot".to_string()));

        let refreshed = shard(dir.path(), false);
        refreshed.init(index(6, "apex")).await.unwrap();
        assert!(lookup(&refreshed, "ap").contains(&"apex".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_automaton_rebuilds_field() {
        let dir = tempfile::tempdir().unwrap();
        shard(dir.path(), false).init(index(1, "apricot")).await.unwrap();
        std::fs::write(dir.path().join("demo/full.fst"), b"garbage").unwrap();

        let reopened = shard(dir.path(), false);
        reopened.init(index(1, "apricot")).await.unwrap();
        assert_eq!(lookup(&reopened, "apr"), vec!["apricot", "april"]);
    }

    #[tokio::test]
    async fn test_increment_and_rebuild_reorders() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        shard.init(index(1, "apricot")).await.unwrap();

        for _ in 0..10 {
            assert!(shard.increment_search_count(FULL_FIELD, "april", 1, true).await.unwrap());
        }
        assert!(matches!(
            shard.increment_search_count(FULL_FIELD, "zebra", 1, true).await,
            Err(SuggesterError::UnknownTerm { .. })
        ));
        assert_eq!(
            shard.popularity_data(FULL_FIELD, 0, 5).await,
            vec![("april".to_string(), 10)]
        );

        shard.rebuild(index(2, "apricot")).await.unwrap();
        assert_eq!(lookup(&shard, "ap").first().map(String::as_str), Some("april"));
    }

    #[tokio::test]
    async fn test_rebuild_removes_vanished_counts() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        shard.init(index(1, "apricot")).await.unwrap();
        shard.increment_search_count(FULL_FIELD, "apricot", 2, true).await.unwrap();

        shard.rebuild(index(2, "banana")).await.unwrap();
        assert!(shard.popularity_data(FULL_FIELD, 0, 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_try_read_fails_while_writer_holds_lock() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        shard.init(index(1, "apricot")).await.unwrap();

        let writer = Arc::clone(&shard.inner).write_owned().await;
        assert!(shard.try_read().is_none());
        assert!(!shard.increment_search_count(FULL_FIELD, "apple", 1, false).await.unwrap());
        drop(writer);

        assert!(shard.try_read().is_some());
    }

    #[tokio::test]
    async fn test_popularity_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = shard(dir.path(), true);
        first.init(index(1, "apricot")).await.unwrap();
        first.increment_search_count(FULL_FIELD, "apply", 3, true).await.unwrap();
        first.flush().await.unwrap();

        let second = shard(dir.path(), true);
        second.init(index(1, "apricot")).await.unwrap();
        assert_eq!(
            second.popularity_data(FULL_FIELD, 0, 1).await,
            vec![("apply".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_remove_deletes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        shard.init(index(1, "apricot")).await.unwrap();

        shard.remove().await.unwrap();
        assert!(!dir.path().join("demo").exists());
        assert!(shard.try_read().is_none());
    }

    #[tokio::test]
    async fn test_removed_shard_refuses_lifecycle_work() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        shard.init(index(1, "apricot")).await.unwrap();
        shard.remove().await.unwrap();

        assert!(matches!(
            shard.rebuild(index(2, "apricot")).await,
            Err(SuggesterError::Terminated)
        ));
        assert!(matches!(
            shard.init(index(2, "apricot")).await,
            Err(SuggesterError::Terminated)
        ));
        assert!(!dir.path().join("demo").exists());
        assert_eq!(shard.state(), ShardState::Uninitialized);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_init() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let shard = Arc::new(
            ShardData::new(
                "demo",
                dir.path().join("demo"),
                BTreeSet::from([FULL_FIELD.to_string()]),
                true,
            )
            .with_cancellation(cancel.child_token()),
        );
        cancel.cancel();

        assert!(shard.is_cancelled());
        assert!(shard.init(index(1, "apricot")).await.is_err());
        assert!(!dir.path().join("demo").exists());
        assert!(shard.try_read().is_none());
    }

    #[tokio::test]
    async fn test_try_flush_skips_busy_shard() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(dir.path(), true);
        shard.init(index(1, "apricot")).await.unwrap();
        shard.increment_search_count(FULL_FIELD, "apple", 2, true).await.unwrap();

        let writer = Arc::clone(&shard.inner).write_owned().await;
        assert!(!shard.try_flush().unwrap());
        drop(writer);
        assert!(shard.try_flush().unwrap());

        let reopened = PopularityStore::open_existing(&dir.path().join("demo"), FULL_FIELD)
            .unwrap()
            .unwrap();
        assert_eq!(reopened.get("apple"), 2);
    }

    #[tokio::test]
    async fn test_rebuild_persists_counts() {
        let dir = tempfile::tempdir().unwrap();
        let first = shard(dir.path(), true);
        first.init(index(1, "apricot")).await.unwrap();
        first.increment_search_count(FULL_FIELD, "april", 4, true).await.unwrap();
        first.rebuild(index(1, "apricot")).await.unwrap();
        drop(first);

        let second = shard(dir.path(), true);
        second.init(index(1, "apricot")).await.unwrap();
        assert_eq!(
            second.popularity_data(FULL_FIELD, 0, 1).await,
            vec![("april".to_string(), 4)]
        );
    }
}
