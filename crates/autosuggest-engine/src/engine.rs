//! Suggester orchestration across shards
//!
//! Lifecycle work (init, rebuild) runs on a bounded pool sized from the CPU
//! count and is serialized per engine. Searches never wait for it: a shard
//! that is busy or missing is skipped and the answer is marked partial.
//!
//! The engine owns every lifecycle task. Work that outlives the termination
//! timeout keeps running until `close`, which waits once more and then aborts it.

use crate::merger::{LookupResultItem, combine_results};
use crate::query::{SuggesterQuery, into_terms, is_complex_query};
use crate::searcher::{ComplexQuerySearcher, SearchOutcome};
use crate::shard::ShardData;
use crate::{SuggesterError, SuggesterResult};
use autosuggest_common::CorrelationId;
use autosuggest_config::SuggesterConfig;
use autosuggest_config::validation::Validate;
use autosuggest_index::{IndexReader, Query, Term};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;

/// Shard key used when projects are disabled
pub const PROJECTS_DISABLED_KEY: &str = "";

/// An index reader together with the project it belongs to
#[derive(Clone)]
pub struct NamedIndex {
    pub name: String,
    pub reader: Arc<dyn IndexReader>,
}

impl NamedIndex {
    pub fn new(name: impl Into<String>, reader: Arc<dyn IndexReader>) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }
}

impl std::fmt::Debug for NamedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedIndex")
            .field("name", &self.name)
            .field("generation", &self.reader.commit_generation())
            .finish_non_exhaustive()
    }
}

/// Answer to a suggestion request
#[derive(Debug, Clone, Default, Serialize)]
pub struct Suggestions {
    pub items: Vec<LookupResultItem>,
    /// Some shard was busy, missing, or cut off by the deadline
    pub partial: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Init,
    Rebuild,
}

type LifecycleOutcome = (Arc<ShardData>, Lifecycle, SuggesterResult<()>);
type LifecycleTasks = JoinSet<LifecycleOutcome>;

/// Completion engine over any number of project shards
pub struct SuggesterEngine {
    config: SuggesterConfig,
    searcher: ComplexQuerySearcher,
    shards: DashMap<String, Arc<ShardData>>,
    rebuild_permits: Arc<Semaphore>,
    search_permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    /// Serializes init and rebuild; holds tasks that outlived their wait
    lifecycle: Mutex<LifecycleTasks>,
    init_done: watch::Sender<bool>,
    rebuilding: watch::Sender<bool>,
}

impl std::fmt::Debug for SuggesterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggesterEngine")
            .field("shards", &self.shards.len())
            .field("terminating", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SuggesterEngine {
    /// Validate `config` and prepare the suggester directory
    ///
    /// # Errors
    /// Returns `SuggesterError::Configuration` for invalid settings and
    /// `SuggesterError::Io` if the suggester directory cannot be created
    pub fn new(config: SuggesterConfig) -> SuggesterResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.suggester_dir)?;

        tracing::info!(
            dir = %config.suggester_dir.display(),
            rebuild_workers = config.rebuild_parallelism(),
            search_workers = config.search_parallelism,
            "Suggester engine created"
        );

        Ok(Self {
            searcher: ComplexQuerySearcher::new(config.result_size),
            shards: DashMap::new(),
            rebuild_permits: Arc::new(Semaphore::new(config.rebuild_parallelism())),
            search_permits: Arc::new(Semaphore::new(config.search_parallelism)),
            shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(LifecycleTasks::new()),
            init_done: watch::Sender::new(false),
            rebuilding: watch::Sender::new(false),
            config,
        })
    }

    pub const fn config(&self) -> &SuggesterConfig {
        &self.config
    }

    pub fn is_terminating(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Names of known shards
    pub fn shard_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shards.iter().map(|s| s.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Shard data for `name`, if created
    pub fn shard(&self, name: &str) -> Option<Arc<ShardData>> {
        self.shards.get(self.shard_key(name)).map(|s| Arc::clone(s.value()))
    }

    fn shard_key<'a>(&self, name: &'a str) -> &'a str {
        if self.config.projects_enabled {
            name
        } else {
            PROJECTS_DISABLED_KEY
        }
    }

    /// Create shards for indexes not seen before and initialize them
    ///
    /// Waits for the submitted work up to the configured termination timeout.
    ///
    /// # Errors
    /// Returns `SuggesterError::Configuration` when projects are disabled and
    /// more than one index is given
    #[tracing::instrument(skip_all, fields(indexes = indexes.len()))]
    pub async fn init(&self, indexes: Vec<NamedIndex>) -> SuggesterResult<()> {
        if self.is_terminating() {
            tracing::debug!("Ignoring init, suggester is terminating");
            return Ok(());
        }
        let mut tasks = self.lifecycle.lock().await;

        for index in self.prepare(indexes)? {
            match self.shards.entry(index.name.clone()) {
                Entry::Occupied(_) => {
                    tracing::debug!(shard = %index.name, "Shard already initialized");
                }
                Entry::Vacant(vacant) => {
                    let shard = Arc::new(self.create_shard(&index));
                    vacant.insert(Arc::clone(&shard));
                    self.submit(&mut tasks, shard, index.reader, Lifecycle::Init);
                }
            }
        }

        self.await_lifecycle(&mut tasks).await;
        self.init_done.send_replace(true);
        Ok(())
    }

    /// Rebuild known shards and initialize unknown ones
    ///
    /// # Errors
    /// Returns `SuggesterError::Configuration` when projects are disabled and
    /// more than one index is given
    #[tracing::instrument(skip_all, fields(indexes = indexes.len()))]
    pub async fn rebuild(&self, indexes: Vec<NamedIndex>) -> SuggesterResult<()> {
        if self.is_terminating() {
            tracing::debug!("Ignoring rebuild, suggester is terminating");
            return Ok(());
        }
        let mut tasks = self.lifecycle.lock().await;
        let indexes = self.prepare(indexes)?;

        self.rebuilding.send_replace(true);
        for index in indexes {
            let existing = self.shards.get(&index.name).map(|s| Arc::clone(s.value()));
            match existing {
                Some(shard) => self.submit(&mut tasks, shard, index.reader, Lifecycle::Rebuild),
                None => {
                    let shard = Arc::new(self.create_shard(&index));
                    self.shards.insert(index.name.clone(), Arc::clone(&shard));
                    self.submit(&mut tasks, shard, index.reader, Lifecycle::Init);
                }
            }
        }

        self.await_lifecycle(&mut tasks).await;
        self.rebuilding.send_replace(false);
        Ok(())
    }

    /// Apply project settings to the requested indexes
    fn prepare(&self, indexes: Vec<NamedIndex>) -> SuggesterResult<Vec<NamedIndex>> {
        if !self.config.projects_enabled {
            if indexes.len() > 1 {
                return Err(SuggesterError::Configuration(format!(
                    "projects are disabled but {} indexes were given",
                    indexes.len()
                )));
            }
            return Ok(indexes
                .into_iter()
                .filter(|index| has_fields(index))
                .map(|index| NamedIndex::new(PROJECTS_DISABLED_KEY, index.reader))
                .collect());
        }

        Ok(indexes
            .into_iter()
            .filter(|index| {
                if !is_safe_shard_name(&index.name) {
                    tracing::warn!(shard = %index.name, "Ignoring index with unusable project name");
                    return false;
                }
                if !self.config.is_project_allowed(&index.name) {
                    tracing::debug!(shard = %index.name, "Project not allowed");
                    return false;
                }
                has_fields(index)
            })
            .collect())
    }

    fn create_shard(&self, index: &NamedIndex) -> ShardData {
        let indexed: BTreeSet<String> = index.reader.fields().into_iter().collect();
        let fields = match &self.config.allowed_fields {
            None => indexed,
            Some(allowed) => allowed
                .iter()
                .filter(|field| {
                    let present = indexed.contains(field.as_str());
                    if !present {
                        tracing::warn!(shard = %index.name, field = %field, "Allowed field is not indexed");
                    }
                    present
                })
                .cloned()
                .collect(),
        };

        let dir = if index.name == PROJECTS_DISABLED_KEY {
            self.config.suggester_dir.clone()
        } else {
            self.config.suggester_dir.join(&index.name)
        };
        ShardData::new(
            index.name.clone(),
            dir,
            fields,
            self.config.allow_most_popular,
        )
        .with_cancellation(self.shutdown.child_token())
    }

    fn submit(
        &self,
        tasks: &mut LifecycleTasks,
        shard: Arc<ShardData>,
        reader: Arc<dyn IndexReader>,
        kind: Lifecycle,
    ) {
        let permits = Arc::clone(&self.rebuild_permits);

        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (shard, kind, Err(SuggesterError::Terminated));
            };
            if shard.is_cancelled() {
                return (shard, kind, Err(SuggesterError::Terminated));
            }
            let result = match kind {
                Lifecycle::Init => shard.init(reader).await,
                Lifecycle::Rebuild => shard.rebuild(reader).await,
            };
            (shard, kind, result)
        });
    }

    /// Wait for lifecycle work until the termination timeout or `close`
    async fn await_lifecycle(&self, tasks: &mut LifecycleTasks) {
        let deadline = self.termination_deadline();
        let finished = tokio::select! {
            () = self.shutdown.cancelled() => None,
            finished = self.join_lifecycle(tasks, deadline) => Some(finished),
        };
        match finished {
            Some(true) => {}
            Some(false) => tracing::warn!(
                remaining = tasks.len(),
                "Lifecycle work did not finish in time; leaving it running"
            ),
            None => tracing::debug!(
                remaining = tasks.len(),
                "Suggester terminating, leaving lifecycle work to close"
            ),
        }
    }

    /// Join tasks until the set is empty (`true`) or `deadline` passes
    async fn join_lifecycle(&self, tasks: &mut LifecycleTasks, deadline: Instant) -> bool {
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(None) => return true,
                Ok(Some(joined)) => self.finish_lifecycle(joined),
                Err(_) => return false,
            }
        }
    }

    fn finish_lifecycle(&self, joined: Result<LifecycleOutcome, JoinError>) {
        match joined {
            Ok((shard, kind, Ok(()))) => {
                tracing::debug!(shard = %shard.name(), ?kind, "Lifecycle task finished");
            }
            Ok((shard, kind, Err(e))) => {
                tracing::warn!(shard = %shard.name(), ?kind, error = %e, "Lifecycle task failed");
                if kind == Lifecycle::Init {
                    self.shards.remove_if(shard.name(), |_, current| {
                        Arc::ptr_eq(current, &shard) && !current.is_initialized()
                    });
                }
            }
            Err(e) if e.is_cancelled() => tracing::debug!("Lifecycle task aborted"),
            Err(e) => tracing::error!(error = %e, "Lifecycle task panicked"),
        }
    }

    fn termination_deadline(&self) -> Instant {
        Instant::now()
            .checked_add(self.config.await_termination())
            .unwrap_or_else(Instant::now)
    }

    /// Suggestions for `suggester_query` across `indexes`
    ///
    /// `query` is the rest of the user's query, if any. Shards that are busy,
    /// missing, or too slow are left out and the result is marked partial.
    #[tracing::instrument(
        skip_all,
        fields(correlation_id = %CorrelationId::new(), field = suggester_query.field(), shards = indexes.len())
    )]
    pub async fn search(
        &self,
        indexes: &[NamedIndex],
        suggester_query: &SuggesterQuery,
        query: Option<&Query>,
    ) -> Suggestions {
        let started = Instant::now();
        if !self.config.enabled || indexes.is_empty() {
            return Suggestions::default();
        }
        if self.is_terminating() {
            return Suggestions {
                partial: true,
                ..Suggestions::default()
            };
        }
        if suggester_query.typed_len() < self.config.min_chars {
            tracing::debug!(min_chars = self.config.min_chars, "Query too short");
            return Suggestions::default();
        }

        let limit = if self.config.projects_enabled {
            self.config.max_projects
        } else {
            1
        };
        let truncated = indexes.len() > limit;
        if truncated {
            tracing::debug!(
                requested = indexes.len(),
                searched = limit,
                "Too many projects, searching only the first"
            );
        }
        let names: Vec<&NamedIndex> = indexes.iter().take(limit).collect();

        let (items, mut partial) = if !is_complex_query(query, suggester_query) {
            self.prefix_search(&names, suggester_query)
        } else if self.config.allow_complex_queries {
            self.complex_search(&names, suggester_query, query).await
        } else {
            tracing::debug!("Complex queries are disabled");
            (Vec::new(), false)
        };
        partial |= truncated && self.config.projects_enabled;

        let items = combine_results(items, self.config.result_size);
        let elapsed = started.elapsed();
        tracing::debug!(items = items.len(), partial, ?elapsed, "Suggestion search finished");
        Suggestions {
            items,
            partial,
            elapsed,
        }
    }

    /// Automaton lookup in every shard that is free right now
    fn prefix_search(
        &self,
        indexes: &[&NamedIndex],
        suggester_query: &SuggesterQuery,
    ) -> (Vec<LookupResultItem>, bool) {
        let mut items = Vec::new();
        let mut partial = false;

        for index in indexes {
            let key = self.shard_key(&index.name);
            let Some(guard) = self.shard(key).and_then(|shard| shard.try_read()) else {
                tracing::debug!(shard = %key, "Shard unavailable");
                partial = true;
                continue;
            };
            items.extend(
                guard
                    .lookup(
                        suggester_query.field(),
                        suggester_query.value(),
                        self.config.result_size,
                    )
                    .into_iter()
                    .map(|s| {
                        LookupResultItem::new(s.term, key, i64::try_from(s.weight).unwrap_or(i64::MAX))
                    }),
            );
        }
        (items, partial)
    }

    /// Document-aware search, one task per shard, bounded by the deadline
    async fn complex_search(
        &self,
        indexes: &[&NamedIndex],
        suggester_query: &SuggesterQuery,
        query: Option<&Query>,
    ) -> (Vec<LookupResultItem>, bool) {
        let deadline = Instant::now()
            .checked_add(self.config.time_threshold())
            .unwrap_or_else(Instant::now);
        let cancel = self.shutdown.child_token();
        let effective = Arc::new(suggester_query.effective_query(query));
        let suggester_query = Arc::new(suggester_query.clone());

        let mut partial = false;
        let mut tasks: JoinSet<SuggesterResult<SearchOutcome>> = JoinSet::new();
        for index in indexes {
            let key = self.shard_key(&index.name).to_string();
            let Some(guard) = self.shard(&key).and_then(|shard| shard.try_read()) else {
                tracing::debug!(shard = %key, "Shard unavailable");
                partial = true;
                continue;
            };

            let permits = Arc::clone(&self.search_permits);
            let cancel = cancel.clone();
            let reader = Arc::clone(&index.reader);
            let effective = Arc::clone(&effective);
            let suggester_query = Arc::clone(&suggester_query);
            let searcher = self.searcher;

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(SuggesterError::Terminated);
                };
                tokio::task::spawn_blocking(move || {
                    let field = suggester_query.field();
                    let popularity = |term: &str| guard.popularity_count(field, term);
                    searcher.search(
                        reader.as_ref(),
                        &key,
                        Option::as_ref(&effective),
                        &suggester_query,
                        &popularity,
                        &cancel,
                    )
                })
                .await?
            });
        }

        let mut items = Vec::new();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(None) => break,
                Ok(Some(Ok(Ok(outcome)))) => {
                    partial |= outcome.interrupted;
                    items.extend(outcome.items);
                }
                Ok(Some(Ok(Err(SuggesterError::Terminated)))) => partial = true,
                Ok(Some(Ok(Err(e)))) => {
                    tracing::warn!(error = %e, "Shard search failed");
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Shard search task aborted");
                    partial = true;
                }
                Err(_) => {
                    tracing::debug!(remaining = tasks.len(), "Search deadline reached");
                    cancel.cancel();
                    tasks.abort_all();
                    partial = true;
                    break;
                }
            }
        }
        (items, partial)
    }

    /// Record the terms of a finished search in each project's popularity store
    ///
    /// Best effort: failures are logged and the remaining terms still count.
    pub async fn on_search(&self, projects: &[String], query: &Query) {
        if !self.config.allow_most_popular {
            return;
        }
        let terms = into_terms(query);
        if terms.is_empty() {
            return;
        }

        let keys: Vec<&str> = if self.config.projects_enabled {
            projects.iter().map(String::as_str).collect()
        } else {
            vec![PROJECTS_DISABLED_KEY]
        };

        for key in keys {
            let Some(shard) = self.shard(key) else {
                tracing::debug!(shard = %key, "No suggester data for project");
                continue;
            };
            for term in &terms {
                match shard
                    .increment_search_count(
                        &term.field,
                        &term.text,
                        1,
                        self.config.popularity_wait_for_lock,
                    )
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(shard = %key, term = %term, "Search count not updated"),
                    Err(e) => tracing::debug!(shard = %key, term = %term, error = %e, "Could not update search count"),
                }
            }
            match shard.try_flush() {
                Ok(true) => {}
                Ok(false) => tracing::debug!(shard = %key, "Shard busy, counts flushed after its rebuild"),
                Err(e) => tracing::warn!(shard = %key, error = %e, "Could not flush search counts"),
            }
        }
    }

    /// Add `value` to the search count of `term` in `project`
    ///
    /// Returns `false` when popularity is disabled or the project is unknown.
    ///
    /// # Errors
    /// Returns `SuggesterError::UnknownTerm` or `SuggesterError::CapacityExceeded`
    pub async fn increase_search_count(
        &self,
        project: &str,
        term: &Term,
        value: u64,
    ) -> SuggesterResult<bool> {
        if !self.config.allow_most_popular {
            return Ok(false);
        }
        let Some(shard) = self.shard(project) else {
            return Ok(false);
        };
        let counted = shard
            .increment_search_count(&term.field, &term.text, value, true)
            .await?;
        if counted && let Err(e) = shard.flush().await {
            tracing::warn!(shard = %shard.name(), error = %e, "Could not flush search counts");
        }
        Ok(counted)
    }

    /// A page of the most searched terms of `field` in `project`
    pub async fn popularity_data(
        &self,
        project: &str,
        field: &str,
        page: usize,
        page_size: usize,
    ) -> Vec<(String, u64)> {
        match self.shard(project) {
            Some(shard) => shard.popularity_data(field, page, page_size).await,
            None => Vec::new(),
        }
    }

    /// Delete the data of the named projects
    pub async fn remove(&self, names: &[String]) {
        for name in names {
            let key = self.shard_key(name);
            let Some((_, shard)) = self.shards.remove(key) else {
                continue;
            };
            match shard.remove().await {
                Ok(()) => tracing::info!(shard = %key, "Removed suggester data"),
                Err(e) => tracing::warn!(shard = %key, error = %e, "Could not remove suggester data"),
            }
        }
    }

    /// Block until the first `init` completes or `limit` passes
    ///
    /// Returns whether init completed.
    pub async fn wait_for_init(&self, limit: Duration) -> bool {
        let mut done = self.init_done.subscribe();
        matches!(timeout(limit, done.wait_for(|done| *done)).await, Ok(Ok(_)))
    }

    /// Block until no rebuild is running or `limit` passes
    ///
    /// Returns whether the engine is idle.
    pub async fn wait_for_rebuild(&self, limit: Duration) -> bool {
        let mut rebuilding = self.rebuilding.subscribe();
        matches!(
            timeout(limit, rebuilding.wait_for(|running| !*running)).await,
            Ok(Ok(_))
        )
    }

    /// Stop all work, flush popularity data and drop every shard
    ///
    /// Safe to call more than once and while searches are running.
    #[tracing::instrument(skip_all)]
    pub async fn close(&self) {
        if self.is_terminating() {
            return;
        }
        self.shutdown.cancel();
        self.search_permits.close();
        self.rebuild_permits.close();

        let deadline = self.termination_deadline();
        match timeout_at(deadline, self.lifecycle.lock()).await {
            Ok(mut tasks) => {
                if !self.join_lifecycle(&mut tasks, deadline).await {
                    tracing::warn!(remaining = tasks.len(), "Aborting lifecycle work still running at shutdown");
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        self.finish_lifecycle(joined);
                    }
                }
            }
            Err(_) => tracing::warn!("Lifecycle lock still held at shutdown"),
        }

        // Work still holding a shard flushes it when it stops
        let shards: Vec<Arc<ShardData>> = self.shards.iter().map(|s| Arc::clone(s.value())).collect();
        for shard in shards {
            match shard.try_flush() {
                Ok(true) => {}
                Ok(false) => tracing::debug!(shard = %shard.name(), "Shard still busy, not flushed"),
                Err(e) => tracing::warn!(shard = %shard.name(), error = %e, "Could not flush popularity data"),
            }
        }
        self.shards.clear();
        tracing::info!("Suggester closed");
    }
}

fn has_fields(index: &NamedIndex) -> bool {
    let present = !index.reader.fields().is_empty();
    if !present {
        tracing::debug!(shard = %index.name, "Index has no fields yet");
    }
    present
}

/// Project names become directory names
fn is_safe_shard_name(name: &str) -> bool {
    !name.is_empty() && name != "." && !name.contains(['/', '\\']) && !name.contains("..")
}
