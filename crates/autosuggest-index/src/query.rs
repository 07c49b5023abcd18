//! Structured queries evaluated against an [`IndexReader`](crate::IndexReader)
//!
//! Query parsing lives upstream; callers hand over an already-built tree. The
//! [`Query::Suggest`] placeholder marks where the term being completed sits.

use crate::{IndexError, IndexResult};
use std::fmt;

/// A single term in a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// Phrase of terms at fixed relative positions, matched with optional slop
///
/// When `suggest_position` is set, the phrase surrounds the term being
/// completed: `terms` holds only the known words and `suggest_position` is the
/// relative position where the missing word belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseQuery {
    field: String,
    terms: Vec<String>,
    positions: Vec<u32>,
    slop: u32,
    suggest_position: Option<u32>,
}

impl PhraseQuery {
    /// Phrase with consecutive positions `0..terms.len()`
    pub fn new(field: impl Into<String>, terms: Vec<String>) -> Self {
        let positions = (0..terms.len())
            .map(|i| u32::try_from(i).unwrap_or(u32::MAX))
            .collect();
        Self {
            field: field.into(),
            terms,
            positions,
            slop: 0,
            suggest_position: None,
        }
    }

    /// Phrase with explicit relative positions
    ///
    /// # Errors
    /// Returns `IndexError::InvalidQuery` if the lengths differ or positions go backwards
    pub fn with_positions(
        field: impl Into<String>,
        terms: Vec<String>,
        positions: Vec<u32>,
    ) -> IndexResult<Self> {
        if terms.len() != positions.len() {
            return Err(IndexError::invalid_query(format!(
                "phrase has {} terms but {} positions",
                terms.len(),
                positions.len()
            )));
        }
        if positions.windows(2).any(|w| matches!(w, [a, b] if b < a)) {
            return Err(IndexError::invalid_query(
                "phrase positions must not go backwards",
            ));
        }
        Ok(Self {
            field: field.into(),
            terms,
            positions,
            slop: 0,
            suggest_position: None,
        })
    }

    #[must_use]
    pub const fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    /// Mark the relative position of the term being completed
    #[must_use]
    pub const fn suggesting_at(mut self, position: u32) -> Self {
        self.suggest_position = Some(position);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub const fn slop(&self) -> u32 {
        self.slop
    }

    pub const fn suggest_position(&self) -> Option<u32> {
        self.suggest_position
    }

    /// Whether the phrase constrains where the completed term may appear
    ///
    /// A suggestion phrase without any known words constrains nothing.
    pub fn surrounds_suggestion(&self) -> bool {
        self.suggest_position.is_some() && !self.terms.is_empty()
    }

    /// Terms paired with their relative positions
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.terms
            .iter()
            .map(String::as_str)
            .zip(self.positions.iter().copied())
    }
}

/// How a boolean clause contributes to the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

/// One clause of a boolean query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanClause {
    pub occur: Occur,
    pub query: Query,
}

impl BooleanClause {
    pub const fn new(occur: Occur, query: Query) -> Self {
        Self { occur, query }
    }
}

/// Structured query tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every document
    MatchAll,
    /// Documents containing a term
    Term(Term),
    /// Documents containing a phrase
    Phrase(PhraseQuery),
    /// Combination of clauses
    Boolean(Vec<BooleanClause>),
    /// Placeholder for the term being completed
    ///
    /// Inside a boolean query it constrains nothing; on its own it leaves no
    /// documents to score.
    Suggest { field: String },
}

impl Query {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Term(Term::new(field, text))
    }

    pub fn must(queries: impl IntoIterator<Item = Self>) -> Self {
        Self::Boolean(
            queries
                .into_iter()
                .map(|q| BooleanClause::new(Occur::Must, q))
                .collect(),
        )
    }

    /// Whether evaluating the query needs term positions
    pub fn needs_positions(&self) -> bool {
        match self {
            Self::Phrase(phrase) => phrase.surrounds_suggestion(),
            Self::Boolean(clauses) => clauses.iter().any(|c| c.query.needs_positions()),
            Self::MatchAll | Self::Term(_) | Self::Suggest { .. } => false,
        }
    }

    /// The first phrase in the tree that surrounds the term being completed
    pub fn suggest_phrase(&self) -> Option<&PhraseQuery> {
        match self {
            Self::Phrase(phrase) if phrase.surrounds_suggestion() => Some(phrase),
            Self::Boolean(clauses) => clauses
                .iter()
                .filter(|c| c.occur != Occur::MustNot)
                .find_map(|c| c.query.suggest_phrase()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_positions_must_match_terms() {
        let result =
            PhraseQuery::with_positions("full", vec!["a".into(), "b".into()], vec![0]);
        assert!(matches!(result, Err(IndexError::InvalidQuery(_))));
    }

    #[test]
    fn test_phrase_positions_must_not_go_backwards() {
        let result =
            PhraseQuery::with_positions("full", vec!["a".into(), "b".into()], vec![2, 1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_phrase_positions_are_consecutive() {
        let phrase = PhraseQuery::new("full", vec!["x".into(), "y".into(), "z".into()]);
        assert_eq!(phrase.positions(), &[0, 1, 2]);
        assert_eq!(phrase.slop(), 0);
    }

    #[test]
    fn test_needs_positions_only_for_suggest_phrases() {
        let plain = Query::Phrase(PhraseQuery::new("full", vec!["a".into()]));
        assert!(!plain.needs_positions());

        let suggest = Query::must([
            Query::term("path", "src"),
            Query::Phrase(PhraseQuery::new("full", vec!["a".into()]).suggesting_at(1)),
        ]);
        assert!(suggest.needs_positions());
        assert_eq!(suggest.suggest_phrase().map(PhraseQuery::suggest_position), Some(Some(1)));
    }

    #[test]
    fn test_suggest_phrase_without_words_needs_no_positions() {
        let lone = Query::Phrase(PhraseQuery::new("full", Vec::new()).suggesting_at(0));
        assert!(!lone.needs_positions());
        assert!(lone.suggest_phrase().is_none());
    }
}
