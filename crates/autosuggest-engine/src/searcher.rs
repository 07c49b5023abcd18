//! Document-aware suggestions for phrase and boolean queries
//!
//! Instead of ranking by global document frequency, each candidate term is
//! scored by how often it occurs in the documents matching the rest of the
//! query. With a phrase around the completed word, only occurrences at
//! positions the phrase allows count.

use crate::automaton::{TERM_ALREADY_SEARCHED_MULTIPLIER, normalize_document_frequency};
use crate::merger::{LookupPriorityQueue, LookupResultItem};
use crate::query::{SuggesterQuery, into_terms_except_phrase};
use crate::SuggesterResult;
use autosuggest_index::{DocSet, IndexReader, PositionMap, Query};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Result of one shard search
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub items: Vec<LookupResultItem>,
    /// Cancellation stopped the scan before every candidate was scored
    pub interrupted: bool,
}

impl SearchOutcome {
    fn interrupted(items: Vec<LookupResultItem>) -> Self {
        Self {
            items,
            interrupted: true,
        }
    }
}

/// Documents (and allowed positions) the rest of the query leaves
struct DocumentConstraint {
    documents: DocSet,
    positions: Option<PositionMap>,
}

/// Scores candidate terms against one shard's index
#[derive(Debug, Clone, Copy)]
pub struct ComplexQuerySearcher {
    result_size: usize,
}

impl ComplexQuerySearcher {
    pub const fn new(result_size: usize) -> Self {
        Self { result_size }
    }

    /// Best `result_size` completions of `suggester_query` within `query`
    ///
    /// `query` is the full query including any phrase around the completed
    /// word; `None` means there is no document constraint.
    ///
    /// # Errors
    /// Returns index read errors from the term dictionary or postings
    pub fn search<R: IndexReader + ?Sized>(
        &self,
        reader: &R,
        project: &str,
        query: Option<&Query>,
        suggester_query: &SuggesterQuery,
        popularity: &dyn Fn(&str) -> u64,
        cancel: &CancellationToken,
    ) -> SuggesterResult<SearchOutcome> {
        if cancel.is_cancelled() {
            return Ok(SearchOutcome::interrupted(Vec::new()));
        }

        let field = suggester_query.field();
        if !reader.has_field(field) {
            tracing::debug!(project, field, "Field not indexed");
            return Ok(SearchOutcome::default());
        }

        let excluded = excluded_terms(query, suggester_query);

        let constraint = match query {
            Some(query) if !matches!(query, Query::MatchAll) => {
                Some(document_constraint(reader, query)?)
            }
            _ => None,
        };
        if cancel.is_cancelled() {
            return Ok(SearchOutcome::interrupted(Vec::new()));
        }

        let num_docs = u64::from(reader.num_docs());
        let terms = reader.terms(field)?;
        let hint = suggester_query.prefix_hint();
        let start = terms.partition_point(|t| t.text.as_str() < hint);

        let mut queue = LookupPriorityQueue::new(self.result_size);
        for entry in terms.iter().skip(start) {
            if !entry.text.starts_with(hint) {
                break;
            }
            if cancel.is_cancelled() {
                return Ok(SearchOutcome::interrupted(queue.into_sorted()));
            }
            if !suggester_query.matches(&entry.text) {
                continue;
            }

            let score = match &constraint {
                None => normalize_document_frequency(u64::from(entry.doc_freq), num_docs),
                Some(constraint) => constraint.score(reader, field, &entry.text)?,
            };
            if score == 0 || excluded.contains(entry.text.as_str()) {
                continue;
            }

            let boosted = score
                .saturating_add(popularity(&entry.text).saturating_mul(TERM_ALREADY_SEARCHED_MULTIPLIER));
            let boosted = i64::try_from(boosted).unwrap_or(i64::MAX);
            if queue.can_insert(boosted) {
                queue.insert(LookupResultItem::new(entry.text.as_str(), project, boosted));
            }
        }

        Ok(SearchOutcome {
            items: queue.into_sorted(),
            interrupted: false,
        })
    }
}

/// Terms already present in the query are not worth suggesting again
///
/// Range suggestions and phrases keep them: repeating a word is legitimate
/// there.
fn excluded_terms(query: Option<&Query>, suggester_query: &SuggesterQuery) -> HashSet<String> {
    let Some(query) = query else {
        return HashSet::new();
    };
    if matches!(query, Query::Phrase(_)) || suggester_query.is_range() {
        return HashSet::new();
    }
    into_terms_except_phrase(query)
        .into_iter()
        .filter(|t| t.field == suggester_query.field())
        .map(|t| t.text)
        .collect()
}

fn document_constraint<R: IndexReader + ?Sized>(
    reader: &R,
    query: &Query,
) -> SuggesterResult<DocumentConstraint> {
    // A lone placeholder leaves nothing to co-occur with
    if matches!(query, Query::Suggest { .. }) {
        return Ok(DocumentConstraint {
            documents: DocSet::new(),
            positions: None,
        });
    }

    let documents = reader.matching_documents(query)?;
    let positions = match query.suggest_phrase() {
        Some(phrase) if query.needs_positions() => {
            Some(reader.suggest_positions(phrase, &documents)?)
        }
        _ => None,
    };
    Ok(DocumentConstraint {
        documents,
        positions,
    })
}

impl DocumentConstraint {
    fn score<R: IndexReader + ?Sized>(
        &self,
        reader: &R,
        field: &str,
        term: &str,
    ) -> SuggesterResult<u64> {
        if self.documents.is_empty() {
            return Ok(0);
        }
        let postings = reader.postings(field, term)?;

        if let Some(positions) = &self.positions {
            // Every occurrence at an allowed position counts
            let count = postings
                .iter()
                .filter(|p| self.documents.contains(p.doc))
                .filter_map(|p| positions.get(&p.doc).map(|allowed| (p, allowed)))
                .map(|(p, allowed)| p.positions.iter().filter(|pos| allowed.contains(pos)).count())
                .sum::<usize>();
            return Ok(u64::try_from(count).unwrap_or(u64::MAX));
        }

        let matching = postings
            .iter()
            .filter(|p| self.documents.contains(p.doc))
            .count();
        Ok(normalize_document_frequency(
            u64::try_from(matching).unwrap_or(u64::MAX),
            u64::try_from(self.documents.len()).unwrap_or(u64::MAX),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosuggest_index::{FULL_FIELD, MemoryIndex, PATH_FIELD, PhraseQuery};

    fn corpus() -> MemoryIndex {
        let mut builder = MemoryIndex::builder();
        builder.add_source("kernel/sched.c", "static int schedule ( void ) { return scheduler_tick ; }");
        builder.add_source("kernel/fork.c", "int copy_process ( void ) { schedule ( ) ; }");
        builder.add_source("lib/string.c", "char * strcpy ( char * dest , const char * src ) { scan }");
        builder.build()
    }

    fn phrases(outcome: &SearchOutcome) -> Vec<&str> {
        outcome.items.iter().map(|i| i.phrase.as_str()).collect()
    }

    fn no_popularity(_: &str) -> u64 {
        0
    }

    #[test]
    fn test_without_constraint_ranks_by_document_frequency() {
        let index = corpus();
        let query = SuggesterQuery::wildcard(FULL_FIELD, "sc*").unwrap();
        let outcome = ComplexQuerySearcher::new(10)
            .search(&index, "p", None, &query, &no_popularity, &CancellationToken::new())
            .unwrap();

        assert_eq!(phrases(&outcome), vec!["schedule", "scan", "scheduler_tick"]);
        assert_eq!(outcome.items.first().map(|i| i.score), Some(666));
        assert!(!outcome.interrupted);
    }

    #[test]
    fn test_boolean_constraint_scores_within_matching_documents() {
        let index = corpus();
        let rest = Query::must([
            Query::term(PATH_FIELD, "kernel"),
            Query::Suggest {
                field: FULL_FIELD.to_string(),
            },
        ]);
        let query = SuggesterQuery::prefix(FULL_FIELD, "s");
        let outcome = ComplexQuerySearcher::new(10)
            .search(&index, "p", Some(&rest), &query, &no_popularity, &CancellationToken::new())
            .unwrap();

        // Both kernel files contain "schedule"; "strcpy" only lives in lib/
        assert_eq!(phrases(&outcome), vec!["schedule", "scheduler_tick", "static"]);
        assert_eq!(outcome.items.first().map(|i| i.score), Some(1000));
    }

    #[test]
    fn test_terms_already_in_query_are_excluded() {
        let index = corpus();
        let rest = Query::must([Query::term(FULL_FIELD, "schedule")]);
        let query = SuggesterQuery::prefix(FULL_FIELD, "sch");
        let outcome = ComplexQuerySearcher::new(10)
            .search(&index, "p", Some(&rest), &query, &no_popularity, &CancellationToken::new())
            .unwrap();

        assert_eq!(phrases(&outcome), vec!["scheduler_tick"]);
    }

    #[test]
    fn test_phrase_counts_allowed_positions() {
        let index = corpus();
        let phrase = PhraseQuery::new(FULL_FIELD, vec!["char".into()]).suggesting_at(1);
        let query = SuggesterQuery::phrase("", phrase).unwrap();
        let effective = query.effective_query(None);
        let outcome = ComplexQuerySearcher::new(10)
            .search(&index, "p", effective.as_ref(), &query, &no_popularity, &CancellationToken::new())
            .unwrap();

        // "char" is followed by "dest" and "src"; "strcpy" follows "char *"
        assert_eq!(phrases(&outcome), vec!["dest", "src", "strcpy"]);
        assert!(outcome.items.iter().all(|i| i.score == 1));
    }

    #[test]
    fn test_popularity_boosts_score() {
        let index = corpus();
        let query = SuggesterQuery::wildcard(FULL_FIELD, "sc*").unwrap();
        let boost = |term: &str| u64::from(term == "scan") * 5;
        let outcome = ComplexQuerySearcher::new(1)
            .search(&index, "p", None, &query, &boost, &CancellationToken::new())
            .unwrap();

        assert_eq!(phrases(&outcome), vec!["scan"]);
        assert_eq!(outcome.items.first().map(|i| i.score), Some(333 + 500));
    }

    #[test]
    fn test_lone_placeholder_yields_nothing() {
        let index = corpus();
        let rest = Query::Suggest {
            field: FULL_FIELD.to_string(),
        };
        let query = SuggesterQuery::prefix(FULL_FIELD, "s");
        let outcome = ComplexQuerySearcher::new(10)
            .search(&index, "p", Some(&rest), &query, &no_popularity, &CancellationToken::new())
            .unwrap();
        assert!(outcome.items.is_empty());
    }

    #[test]
    fn test_cancelled_search_is_interrupted() {
        let index = corpus();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let query = SuggesterQuery::prefix(FULL_FIELD, "s");
        let outcome = ComplexQuerySearcher::new(10)
            .search(&index, "p", None, &query, &no_popularity, &cancel)
            .unwrap();

        assert!(outcome.interrupted);
        assert!(outcome.items.is_empty());
    }
}
