//! Default query evaluation over postings
//!
//! Phrase matching normalizes every occurrence of a phrase word to the start
//! position it implies (`position - relative_position`) and looks for minimal
//! windows that cover all words. A window matches when its width is within the
//! phrase slop; an exact phrase is a window of width zero.

use crate::query::{BooleanClause, Occur, PhraseQuery, Query};
use crate::reader::{DocId, DocSet, IndexReader, PositionMap};
use crate::IndexResult;
use std::collections::{BTreeSet, HashMap};

/// Start positions (in normalized coordinates) of one phrase match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: i64,
    end: i64,
}

impl Window {
    const fn width(self) -> i64 {
        self.end.saturating_sub(self.start)
    }
}

pub(crate) fn matching_documents<R: IndexReader + ?Sized>(
    reader: &R,
    query: &Query,
) -> IndexResult<DocSet> {
    match query {
        Query::MatchAll | Query::Suggest { .. } => Ok(DocSet::all(reader.num_docs())),
        Query::Term(term) => Ok(reader
            .postings(&term.field, &term.text)?
            .iter()
            .map(|p| p.doc)
            .collect()),
        Query::Phrase(phrase) => phrase_documents(reader, phrase),
        Query::Boolean(clauses) => boolean_documents(reader, clauses),
    }
}

fn boolean_documents<R: IndexReader + ?Sized>(
    reader: &R,
    clauses: &[BooleanClause],
) -> IndexResult<DocSet> {
    if clauses.is_empty() {
        return Ok(DocSet::new());
    }

    let mut required: Option<DocSet> = None;
    let mut optional: Option<DocSet> = None;
    let mut excluded = DocSet::new();

    for clause in clauses {
        let docs = matching_documents(reader, &clause.query)?;
        match clause.occur {
            Occur::Must => {
                required = Some(match required {
                    Some(current) => current.intersection(&docs),
                    None => docs,
                });
            }
            Occur::Should => {
                optional = Some(match optional {
                    Some(current) => current.union(&docs),
                    None => docs,
                });
            }
            Occur::MustNot => excluded = excluded.union(&docs),
        }
    }

    // SHOULD clauses only narrow the result when nothing is required
    let base = required
        .or(optional)
        .unwrap_or_else(|| DocSet::all(reader.num_docs()));
    Ok(base.difference(&excluded))
}

/// Per phrase word: document -> positions
type PhrasePostings = Vec<HashMap<DocId, Vec<u32>>>;

fn load_phrase_postings<R: IndexReader + ?Sized>(
    reader: &R,
    phrase: &PhraseQuery,
) -> IndexResult<PhrasePostings> {
    phrase
        .terms()
        .iter()
        .map(|term| {
            Ok(reader
                .postings(phrase.field(), term)?
                .into_iter()
                .map(|p| (p.doc, p.positions))
                .collect())
        })
        .collect()
}

/// Documents containing every phrase word
fn candidate_documents(postings: &PhrasePostings) -> DocSet {
    let mut words = postings.iter();
    let Some(first) = words.next() else {
        return DocSet::new();
    };
    let mut docs: DocSet = first.keys().copied().collect();
    for word in words {
        docs = docs.iter().filter(|doc| word.contains_key(doc)).collect();
    }
    docs
}

fn occurrences<'a>(postings: &'a PhrasePostings, doc: DocId) -> Option<Vec<&'a [u32]>> {
    postings
        .iter()
        .map(|word| word.get(&doc).map(Vec::as_slice))
        .collect()
}

/// Minimal covering windows whose width is within `slop`
fn phrase_windows(occurrences: &[&[u32]], relative: &[u32], slop: u32) -> Vec<Window> {
    let mut entries: Vec<(i64, usize)> = occurrences
        .iter()
        .zip(relative)
        .enumerate()
        .flat_map(|(word, (positions, &rel))| {
            positions
                .iter()
                .map(move |&p| (i64::from(p).saturating_sub(i64::from(rel)), word))
        })
        .collect();
    entries.sort_unstable();

    let words = occurrences.len();
    let mut counts = vec![0_usize; words];
    let mut covered = 0_usize;
    let mut left = 0_usize;
    let mut windows = Vec::new();

    for &(end, word) in &entries {
        if let Some(count) = counts.get_mut(word) {
            if *count == 0 {
                covered = covered.saturating_add(1);
            }
            *count = count.saturating_add(1);
        }

        if covered < words {
            continue;
        }

        // Drop leading entries that are not needed to keep every word covered
        while let Some(&(_, head)) = entries.get(left) {
            match counts.get_mut(head) {
                Some(count) if *count > 1 => {
                    *count = count.saturating_sub(1);
                    left = left.saturating_add(1);
                }
                _ => break,
            }
        }

        let Some(&(start, head)) = entries.get(left) else {
            break;
        };
        let window = Window { start, end };
        if window.width() <= i64::from(slop) {
            windows.push(window);
        }

        // Release the head so the next window must start later
        if let Some(count) = counts.get_mut(head) {
            *count = count.saturating_sub(1);
            covered = covered.saturating_sub(1);
        }
        left = left.saturating_add(1);
    }

    windows
}

fn phrase_documents<R: IndexReader + ?Sized>(
    reader: &R,
    phrase: &PhraseQuery,
) -> IndexResult<DocSet> {
    if phrase.terms().is_empty() {
        return Ok(DocSet::all(reader.num_docs()));
    }

    let postings = load_phrase_postings(reader, phrase)?;
    Ok(candidate_documents(&postings)
        .iter()
        .filter(|&doc| {
            occurrences(&postings, doc).is_some_and(|occ| {
                !phrase_windows(&occ, phrase.positions(), phrase.slop()).is_empty()
            })
        })
        .collect())
}

pub(crate) fn suggest_positions<R: IndexReader + ?Sized>(
    reader: &R,
    phrase: &PhraseQuery,
    docs: &DocSet,
) -> IndexResult<PositionMap> {
    let mut result = PositionMap::new();
    let Some(suggest_position) = phrase.suggest_position() else {
        return Ok(result);
    };

    let postings = load_phrase_postings(reader, phrase)?;
    let slop = i64::from(phrase.slop());

    for doc in candidate_documents(&postings).intersection(docs).iter() {
        let Some(occ) = occurrences(&postings, doc) else {
            continue;
        };
        let occupied: BTreeSet<u32> = occ.iter().flat_map(|p| p.iter().copied()).collect();

        let mut allowed = BTreeSet::new();
        for window in phrase_windows(&occ, phrase.positions(), phrase.slop()) {
            let expected = window.end.saturating_add(i64::from(suggest_position));
            let range = slop.saturating_sub(window.width());
            for candidate in expected.saturating_sub(range)..=expected.saturating_add(range) {
                if let Ok(position) = u32::try_from(candidate)
                    && !occupied.contains(&position)
                {
                    allowed.insert(position);
                }
            }
        }

        if !allowed.is_empty() {
            result.insert(doc, allowed);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_window_requires_adjacent_words() {
        // "a b" at 3,4 matches; "a" at 10 with "b" at 12 does not
        let a: &[u32] = &[3, 10];
        let b: &[u32] = &[4, 12];
        let windows = phrase_windows(&[a, b], &[0, 1], 0);
        assert_eq!(windows, vec![Window { start: 3, end: 3 }]);
    }

    #[test]
    fn test_sloppy_window_allows_gap() {
        let a: &[u32] = &[10];
        let b: &[u32] = &[12];
        assert!(phrase_windows(&[a, b], &[0, 1], 0).is_empty());
        assert_eq!(
            phrase_windows(&[a, b], &[0, 1], 1),
            vec![Window { start: 10, end: 11 }]
        );
    }

    #[test]
    fn test_windows_without_all_words_are_ignored() {
        let a: &[u32] = &[1, 2, 3];
        let b: &[u32] = &[];
        assert!(phrase_windows(&[a, b], &[0, 1], 5).is_empty());
    }
}
