//! Subcommands and their execution against an initialized engine

use crate::sources;
use anyhow::{Context, Result};
use autosuggest_engine::{NamedIndex, SuggesterEngine, SuggesterQuery};
use autosuggest_index::{FULL_FIELD, PhraseQuery, Query};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Complete a partially typed term
    Suggest(SuggestArgs),

    /// Count a finished search toward term popularity in every project
    Record {
        /// Field the terms were searched in
        #[arg(long, default_value = FULL_FIELD)]
        field: String,

        /// Searched terms
        #[arg(required = true)]
        terms: Vec<String>,
    },

    /// Show the most searched terms of a project
    Popular {
        #[arg(long)]
        project: String,

        #[arg(long, default_value = FULL_FIELD)]
        field: String,

        #[arg(long, default_value_t = 0)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },

    /// Rebuild completion data from the sources
    Rebuild,

    /// Re-index and rebuild periodically until interrupted
    Watch {
        /// Seconds between rebuilds, at least 1
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
}

/// How the typed text is matched against terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchKind {
    Prefix,
    /// `?` and `*` wildcards
    Wildcard,
    Regexp,
    /// Terms within `--max-edits` edits
    Fuzzy,
}

#[derive(clap::Args, Debug)]
pub struct SuggestArgs {
    /// Text typed so far
    text: String,

    #[arg(long, default_value = FULL_FIELD)]
    field: String,

    #[arg(long, value_enum, default_value_t = MatchKind::Prefix)]
    kind: MatchKind,

    #[arg(long, default_value_t = 2)]
    max_edits: u32,

    /// Words directly preceding the completion, as in a phrase (repeatable)
    #[arg(long = "after")]
    after: Vec<String>,

    /// Other query terms; only documents containing all of them count (repeatable)
    #[arg(long = "with")]
    with: Vec<String>,
}

impl SuggestArgs {
    fn suggester_query(&self) -> Result<SuggesterQuery> {
        if !self.after.is_empty() {
            let position = u32::try_from(self.after.len()).context("Phrase is too long")?;
            let phrase =
                PhraseQuery::new(self.field.as_str(), self.after.clone()).suggesting_at(position);
            return Ok(SuggesterQuery::phrase(self.text.as_str(), phrase)?);
        }

        let query = match self.kind {
            MatchKind::Prefix => SuggesterQuery::prefix(self.field.as_str(), self.text.as_str()),
            MatchKind::Wildcard => SuggesterQuery::wildcard(self.field.as_str(), self.text.as_str())?,
            MatchKind::Regexp => SuggesterQuery::regexp(self.field.as_str(), self.text.as_str())?,
            MatchKind::Fuzzy => {
                SuggesterQuery::fuzzy(self.field.as_str(), self.text.as_str(), self.max_edits, 0)?
            }
        };
        Ok(query)
    }

    /// The rest of the query, built from the `--with` terms
    fn rest(&self) -> Option<Query> {
        match self.with.as_slice() {
            [] => None,
            [single] => Some(Query::term(self.field.as_str(), single.as_str())),
            many => Some(Query::must(
                many.iter()
                    .map(|term| Query::term(self.field.as_str(), term.as_str())),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct PopularTerm {
    term: String,
    count: u64,
}

/// Execute `command`, printing results as JSON on stdout
pub async fn run(
    engine: &SuggesterEngine,
    roots: &[PathBuf],
    indexes: Vec<NamedIndex>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Suggest(args) => {
            let suggester_query = args.suggester_query()?;
            let rest = args.rest();
            let suggestions = engine
                .search(&indexes, &suggester_query, rest.as_ref())
                .await;
            print_json(&suggestions)
        }
        Command::Record { field, terms } => {
            let query = Query::must(terms.iter().map(|term| Query::term(field.as_str(), term.as_str())));
            let projects: Vec<String> = indexes.iter().map(|index| index.name.clone()).collect();
            engine.on_search(&projects, &query).await;
            tracing::info!(terms = terms.len(), projects = projects.len(), "Recorded search");
            Ok(())
        }
        Command::Popular {
            project,
            field,
            page,
            page_size,
        } => {
            let terms: Vec<PopularTerm> = engine
                .popularity_data(&project, &field, page, page_size)
                .await
                .into_iter()
                .map(|(term, count)| PopularTerm { term, count })
                .collect();
            print_json(&terms)
        }
        Command::Rebuild => {
            engine.rebuild(indexes).await?;
            print_json(&engine.shard_names())
        }
        Command::Watch { interval_secs } => {
            watch(engine, roots, Duration::from_secs(interval_secs.max(1))).await
        }
    }
}

async fn watch(engine: &SuggesterEngine, roots: &[PathBuf], interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires at once; init has just built everything
    ticker.tick().await;
    tracing::info!(?interval, "Watching sources, press Ctrl-C to stop");

    // Listeners live across iterations so a signal during a rebuild is kept
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                tracing::info!("Stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                match sources::load_projects(roots) {
                    Ok(indexes) => engine.rebuild(indexes).await?,
                    Err(e) => tracing::warn!(error = %e, "Could not reload sources, keeping current data"),
                }
            }
        }
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where signals exist
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => interrupted.context("Failed to listen for Ctrl-C"),
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
                Ok(())
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn suggest_args(argv: &[&str]) -> SuggestArgs {
        let cli = TestCli::try_parse_from(std::iter::once("autosuggest").chain(argv.iter().copied())).unwrap();
        match cli.command {
            Command::Suggest(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_is_a_prefix_query() {
        let args = suggest_args(&["suggest", "sched"]);
        let query = args.suggester_query().unwrap();

        assert!(query.is_prefix());
        assert_eq!(query.field(), FULL_FIELD);
        assert!(args.rest().is_none());
    }

    #[test]
    fn test_after_words_make_a_phrase() {
        let args = suggest_args(&["suggest", "ap", "--after", "fn"]);
        let query = args.suggester_query().unwrap();

        assert!(matches!(query, SuggesterQuery::Phrase { .. }));
        assert_eq!(query.value(), "ap");
    }

    #[test]
    fn test_with_terms_constrain_documents() {
        let args = suggest_args(&["suggest", "sc", "--with", "kernel", "--with", "fork"]);
        assert!(matches!(args.rest(), Some(Query::Boolean(_))));

        let single = suggest_args(&["suggest", "sc", "--with", "kernel"]);
        assert_eq!(single.rest(), Some(Query::term(FULL_FIELD, "kernel")));
    }

    #[test]
    fn test_fuzzy_edit_limit_is_checked() {
        let args = suggest_args(&["suggest", "shedule", "--kind", "fuzzy", "--max-edits", "3"]);
        assert!(args.suggester_query().is_err());
    }
}
