//! Suggester queries: which terms of a field are candidates for completion

use crate::{SuggesterError, SuggesterResult};
use autosuggest_index::{Occur, PhraseQuery, Query, Term};
use regex::Regex;

/// Fuzzy queries allow at most this many edits
pub const MAX_FUZZY_EDITS: u32 = 2;

/// Which bound of a range query is being typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Lower,
    Upper,
}

/// The term being completed, together with how candidates are matched
#[derive(Debug, Clone)]
pub enum SuggesterQuery {
    /// Terms starting with `prefix`
    Prefix { field: String, prefix: String },
    /// Terms matching a `?`/`*` pattern
    Wildcard {
        field: String,
        pattern: String,
        regex: Regex,
    },
    /// Terms fully matching a regular expression
    Regexp {
        field: String,
        pattern: String,
        regex: Regex,
    },
    /// Terms within `max_edits` of `term`, sharing its first `prefix_length` chars
    Fuzzy {
        field: String,
        term: String,
        max_edits: u32,
        prefix_length: usize,
    },
    /// Terms starting with the typed bound and within the other bound
    Range {
        field: String,
        lower: String,
        upper: String,
        include_lower: bool,
        include_upper: bool,
        suggest: RangeBound,
    },
    /// Terms starting with `prefix` at the suggestion position of `phrase`
    Phrase {
        field: String,
        prefix: String,
        phrase: PhraseQuery,
    },
}

impl SuggesterQuery {
    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// # Errors
    /// Returns `SuggesterError::InvalidQuery` if the pattern cannot be compiled
    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> SuggesterResult<Self> {
        let pattern = pattern.into();
        let mut translated = String::with_capacity(pattern.len().saturating_add(8));
        translated.push('^');
        for c in pattern.chars() {
            match c {
                '*' => translated.push_str(".*"),
                '?' => translated.push('.'),
                other => translated.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated)
            .map_err(|e| SuggesterError::InvalidQuery(format!("wildcard {pattern}: {e}")))?;
        Ok(Self::Wildcard {
            field: field.into(),
            pattern,
            regex,
        })
    }

    /// # Errors
    /// Returns `SuggesterError::InvalidQuery` if the expression cannot be compiled
    pub fn regexp(field: impl Into<String>, pattern: impl Into<String>) -> SuggesterResult<Self> {
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| SuggesterError::InvalidQuery(format!("regexp {pattern}: {e}")))?;
        Ok(Self::Regexp {
            field: field.into(),
            pattern,
            regex,
        })
    }

    /// # Errors
    /// Returns `SuggesterError::InvalidQuery` if `max_edits` exceeds [`MAX_FUZZY_EDITS`]
    pub fn fuzzy(
        field: impl Into<String>,
        term: impl Into<String>,
        max_edits: u32,
        prefix_length: usize,
    ) -> SuggesterResult<Self> {
        if max_edits > MAX_FUZZY_EDITS {
            return Err(SuggesterError::InvalidQuery(format!(
                "fuzzy queries allow at most {MAX_FUZZY_EDITS} edits, got {max_edits}"
            )));
        }
        Ok(Self::Fuzzy {
            field: field.into(),
            term: term.into(),
            max_edits,
            prefix_length,
        })
    }

    pub fn range(
        field: impl Into<String>,
        lower: impl Into<String>,
        upper: impl Into<String>,
        include_lower: bool,
        include_upper: bool,
        suggest: RangeBound,
    ) -> Self {
        Self::Range {
            field: field.into(),
            lower: lower.into(),
            upper: upper.into(),
            include_lower,
            include_upper,
            suggest,
        }
    }

    /// Completion of the word at the suggestion position of `phrase`
    ///
    /// # Errors
    /// Returns `SuggesterError::InvalidQuery` if the phrase has no suggestion
    /// position or belongs to another field
    pub fn phrase(prefix: impl Into<String>, phrase: PhraseQuery) -> SuggesterResult<Self> {
        if phrase.suggest_position().is_none() {
            return Err(SuggesterError::InvalidQuery(
                "phrase has no suggestion position".to_string(),
            ));
        }
        Ok(Self::Phrase {
            field: phrase.field().to_string(),
            prefix: prefix.into(),
            phrase,
        })
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Prefix { field, .. }
            | Self::Wildcard { field, .. }
            | Self::Regexp { field, .. }
            | Self::Fuzzy { field, .. }
            | Self::Range { field, .. }
            | Self::Phrase { field, .. } => field,
        }
    }

    /// The text the user has typed so far
    pub fn value(&self) -> &str {
        match self {
            Self::Prefix { prefix, .. } | Self::Phrase { prefix, .. } => prefix,
            Self::Wildcard { pattern, .. } | Self::Regexp { pattern, .. } => pattern,
            Self::Fuzzy { term, .. } => term,
            Self::Range {
                lower,
                upper,
                suggest,
                ..
            } => match suggest {
                RangeBound::Lower => lower,
                RangeBound::Upper => upper,
            },
        }
    }

    /// Number of characters typed, compared against the minimum length
    pub fn typed_len(&self) -> usize {
        self.value().chars().count()
    }

    /// Literal prefix every candidate shares; narrows the dictionary scan
    pub fn prefix_hint(&self) -> &str {
        match self {
            Self::Prefix { prefix, .. } | Self::Phrase { prefix, .. } => prefix,
            Self::Wildcard { pattern, .. } => {
                let end = pattern.find(['*', '?']).unwrap_or(pattern.len());
                pattern.get(..end).unwrap_or_default()
            }
            Self::Regexp { .. } => "",
            Self::Fuzzy {
                term,
                prefix_length,
                ..
            } => {
                let end = term
                    .char_indices()
                    .nth(*prefix_length)
                    .map_or(term.len(), |(i, _)| i);
                term.get(..end).unwrap_or_default()
            }
            Self::Range {
                lower,
                upper,
                suggest,
                ..
            } => match suggest {
                RangeBound::Lower => lower,
                RangeBound::Upper => upper,
            },
        }
    }

    /// Whether `term` is a syntactic candidate for this query
    pub fn matches(&self, term: &str) -> bool {
        match self {
            Self::Prefix { prefix, .. } | Self::Phrase { prefix, .. } => term.starts_with(prefix.as_str()),
            Self::Wildcard { regex, .. } | Self::Regexp { regex, .. } => regex.is_match(term),
            Self::Fuzzy {
                term: target,
                max_edits,
                ..
            } => {
                term.starts_with(self.prefix_hint())
                    && u32::try_from(strsim::osa_distance(term, target))
                        .is_ok_and(|distance| distance <= *max_edits)
            }
            Self::Range {
                lower,
                upper,
                include_lower,
                include_upper,
                suggest,
                ..
            } => match suggest {
                RangeBound::Lower => {
                    term.starts_with(lower.as_str())
                        && (upper.is_empty()
                            || if *include_upper {
                                term <= upper.as_str()
                            } else {
                                term < upper.as_str()
                            })
                }
                RangeBound::Upper => {
                    term.starts_with(upper.as_str())
                        && (lower.is_empty()
                            || if *include_lower {
                                term >= lower.as_str()
                            } else {
                                term > lower.as_str()
                            })
                }
            },
        }
    }

    pub const fn is_prefix(&self) -> bool {
        matches!(self, Self::Prefix { .. })
    }

    pub const fn is_range(&self) -> bool {
        matches!(self, Self::Range { .. })
    }

    /// The query evaluated against the index for this suggestion
    ///
    /// A phrase suggestion must hold in every matching document, so its
    /// phrase is required alongside the rest of the query.
    pub fn effective_query(&self, rest: Option<&Query>) -> Option<Query> {
        match (self, rest) {
            (Self::Phrase { phrase, .. }, None) => Some(Query::Phrase(phrase.clone())),
            (Self::Phrase { phrase, .. }, Some(rest)) => {
                Some(Query::must([rest.clone(), Query::Phrase(phrase.clone())]))
            }
            (_, rest) => rest.cloned(),
        }
    }
}

/// Whether answering needs more than an automaton prefix lookup
pub const fn is_complex_query(query: Option<&Query>, suggester_query: &SuggesterQuery) -> bool {
    query.is_some() || !suggester_query.is_prefix()
}

/// Literal terms of a query, phrase words included
///
/// Negated clauses are skipped; they were not searched for.
pub fn into_terms(query: &Query) -> Vec<Term> {
    let mut terms = Vec::new();
    collect_terms(query, true, &mut terms);
    terms
}

/// Literal terms of a query outside of phrases
pub fn into_terms_except_phrase(query: &Query) -> Vec<Term> {
    let mut terms = Vec::new();
    collect_terms(query, false, &mut terms);
    terms
}

fn collect_terms(query: &Query, include_phrases: bool, terms: &mut Vec<Term>) {
    match query {
        Query::Term(term) => terms.push(term.clone()),
        Query::Phrase(phrase) if include_phrases => {
            terms.extend(phrase.terms().iter().map(|t| Term::new(phrase.field(), t.as_str())));
        }
        Query::Boolean(clauses) => {
            for clause in clauses.iter().filter(|c| c.occur != Occur::MustNot) {
                collect_terms(&clause.query, include_phrases, terms);
            }
        }
        Query::Phrase(_) | Query::MatchAll | Query::Suggest { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autosuggest_index::BooleanClause;

    #[test]
    fn test_prefix_matches() {
        let query = SuggesterQuery::prefix("full", "sch");
        assert!(query.matches("schedule"));
        assert!(!query.matches("fork"));
        assert_eq!(query.prefix_hint(), "sch");
        assert!(query.is_prefix());
    }

    #[test]
    fn test_wildcard_matches() {
        let query = SuggesterQuery::wildcard("full", "ma?l*c").unwrap();
        assert!(query.matches("malloc"));
        assert!(query.matches("mailc"));
        assert!(!query.matches("calloc"));
        assert_eq!(query.prefix_hint(), "ma");

        let dotted = SuggesterQuery::wildcard("full", "a.b*").unwrap();
        assert!(dotted.matches("a.bc"));
        assert!(!dotted.matches("axbc"));
    }

    #[test]
    fn test_regexp_must_match_whole_term() {
        let query = SuggesterQuery::regexp("full", "str(cpy|cat)").unwrap();
        assert!(query.matches("strcpy"));
        assert!(!query.matches("strcpy_s"));
        assert!(SuggesterQuery::regexp("full", "(").is_err());
    }

    #[test]
    fn test_fuzzy_matches_within_edits() {
        let query = SuggesterQuery::fuzzy("full", "mallco", 1, 2).unwrap();
        assert!(query.matches("malloc"));
        assert!(!query.matches("calloc"));
        assert_eq!(query.prefix_hint(), "ma");
        assert!(SuggesterQuery::fuzzy("full", "x", 3, 0).is_err());
    }

    #[test]
    fn test_range_lower_bound_is_typed() {
        let query = SuggesterQuery::range("full", "ap", "apz", true, false, RangeBound::Lower);
        assert!(query.matches("apple"));
        assert!(!query.matches("apz"));
        assert!(!query.matches("banana"));
        assert!(query.is_range());
        assert_eq!(query.value(), "ap");
    }

    #[test]
    fn test_range_upper_bound_is_typed() {
        let query = SuggesterQuery::range("full", "b", "ca", false, true, RangeBound::Upper);
        assert!(query.matches("cat"));
        assert!(!query.matches("apple"));

        let open = SuggesterQuery::range("full", "", "ca", true, true, RangeBound::Upper);
        assert!(open.matches("car"));
    }

    #[test]
    fn test_phrase_requires_suggestion_position() {
        let phrase = PhraseQuery::new("full", vec!["int".into()]);
        assert!(SuggesterQuery::phrase("sch", phrase.clone()).is_err());

        let query = SuggesterQuery::phrase("sch", phrase.suggesting_at(1)).unwrap();
        assert_eq!(query.field(), "full");
        assert!(matches!(
            query.effective_query(None),
            Some(Query::Phrase(_))
        ));
        assert!(matches!(
            query.effective_query(Some(&Query::term("path", "kernel"))),
            Some(Query::Boolean(clauses)) if clauses.len() == 2
        ));
    }

    #[test]
    fn test_complex_query_detection() {
        let prefix = SuggesterQuery::prefix("full", "a");
        let wildcard = SuggesterQuery::wildcard("full", "a*b").unwrap();
        assert!(!is_complex_query(None, &prefix));
        assert!(is_complex_query(None, &wildcard));
        assert!(is_complex_query(Some(&Query::MatchAll), &prefix));
    }

    #[test]
    fn test_into_terms() {
        let query = Query::Boolean(vec![
            BooleanClause::new(Occur::Must, Query::term("full", "int")),
            BooleanClause::new(Occur::MustNot, Query::term("full", "static")),
            BooleanClause::new(
                Occur::Should,
                Query::Phrase(PhraseQuery::new("full", vec!["copy".into(), "process".into()])),
            ),
        ]);

        let all: Vec<String> = into_terms(&query).into_iter().map(|t| t.text).collect();
        assert_eq!(all, vec!["int", "copy", "process"]);

        let plain: Vec<String> = into_terms_except_phrase(&query)
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(plain, vec!["int"]);
    }
}
