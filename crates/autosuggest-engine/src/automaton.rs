//! Weighted completion automaton backed by an `fst::Map`
//!
//! Keys are term bytes, values are weights. Prefix lookups walk the
//! `starts_with` stream and keep the best `limit` entries in a bounded heap.

use crate::{SuggesterError, SuggesterResult};
use autosuggest_index::IndexReader;
use fst::automaton::Str;
use fst::{Automaton, IntoStreamer, Map, Streamer};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::path::Path;

/// Terms longer than this many bytes are never added
pub const MAX_TERM_SIZE: usize = 32_764;

/// Scale applied to the normalized document frequency
pub const NORMALIZED_DOCUMENT_FREQUENCY_MULTIPLIER: u64 = 1_000;

/// Weight added per recorded search of a term
pub const TERM_ALREADY_SEARCHED_MULTIPLIER: u64 = 100;

/// Average term length assumed for fields without terms
pub const AVERAGE_LENGTH_DEFAULT: f64 = 22.0;

const FILE_MAGIC: &[u8; 5] = b"ASFST";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 6;

/// A completion candidate returned by [`CompletionAutomaton::lookup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub term: String,
    pub weight: u64,
}

// Heap order: "greater" is the better suggestion
impl Ord for Suggestion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| other.term.cmp(&self.term))
    }
}

impl PartialOrd for Suggestion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Numbers gathered while building an automaton from a term dictionary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BuildStats {
    pub term_count: u64,
    pub total_term_length: u64,
}

impl BuildStats {
    /// Average key length used to size the popularity store
    #[allow(clippy::cast_precision_loss)]
    pub fn average_term_length(&self) -> f64 {
        if self.term_count == 0 {
            AVERAGE_LENGTH_DEFAULT
        } else {
            self.total_term_length as f64 / self.term_count as f64
        }
    }
}

/// `floor(doc_freq / num_docs * 1000)`, or 0 for an empty index
pub fn normalize_document_frequency(count: u64, documents: u64) -> u64 {
    count
        .saturating_mul(NORMALIZED_DOCUMENT_FREQUENCY_MULTIPLIER)
        .checked_div(documents)
        .unwrap_or(0)
}

/// Immutable term -> weight automaton for one field
#[derive(Clone)]
pub struct CompletionAutomaton {
    map: Map<Vec<u8>>,
}

impl std::fmt::Debug for CompletionAutomaton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionAutomaton")
            .field("terms", &self.map.len())
            .finish()
    }
}

impl CompletionAutomaton {
    /// Build from term/weight pairs in any order
    ///
    /// Duplicate terms keep the last weight seen.
    ///
    /// # Errors
    /// Returns `SuggesterError::Automaton` if the fst builder fails
    pub fn build(entries: impl IntoIterator<Item = (String, u64)>) -> SuggesterResult<Self> {
        let sorted: BTreeMap<String, u64> = entries
            .into_iter()
            .filter(|(term, _)| term.len() <= MAX_TERM_SIZE)
            .collect();
        let map = Map::from_iter(sorted)?;
        Ok(Self { map })
    }

    /// Build from the term dictionary of `field`
    ///
    /// `searched` returns the recorded search count of a term.
    ///
    /// # Errors
    /// Returns index read errors or `SuggesterError::Automaton`
    pub fn build_from_index<R, F>(
        reader: &R,
        field: &str,
        searched: F,
    ) -> SuggesterResult<(Self, BuildStats)>
    where
        R: IndexReader + ?Sized,
        F: Fn(&str) -> u64,
    {
        let num_docs = u64::from(reader.num_docs());
        let mut stats = BuildStats::default();
        let mut entries = Vec::new();

        // Dictionary order is byte order
        for entry in reader.terms(field)? {
            if entry.text.len() > MAX_TERM_SIZE {
                tracing::debug!(field, length = entry.text.len(), "Skipping oversized term");
                continue;
            }
            let popularity = searched(&entry.text).saturating_mul(TERM_ALREADY_SEARCHED_MULTIPLIER);
            let weight = normalize_document_frequency(u64::from(entry.doc_freq), num_docs)
                .saturating_add(popularity);

            stats.term_count = stats.term_count.saturating_add(1);
            stats.total_term_length = stats
                .total_term_length
                .saturating_add(u64::try_from(entry.text.len()).unwrap_or(u64::MAX));
            entries.push((entry.text, weight));
        }

        entries.dedup_by(|a, b| a.0 == b.0);
        let map = Map::from_iter(entries)?;
        Ok((Self { map }, stats))
    }

    /// Up to `limit` terms starting with `prefix`, best first
    ///
    /// Ordered by weight descending, ties by term ascending.
    pub fn lookup(&self, prefix: &str, limit: usize) -> Vec<Suggestion> {
        if limit == 0 {
            return Vec::new();
        }

        let matcher = Str::new(prefix).starts_with();
        let mut stream = self.map.search(matcher).into_stream();
        let mut best: BinaryHeap<Reverse<Suggestion>> =
            BinaryHeap::with_capacity(limit.saturating_add(1));

        while let Some((key, weight)) = stream.next() {
            let Ok(term) = std::str::from_utf8(key) else {
                continue;
            };
            let beaten = best.peek().is_some_and(|Reverse(worst)| {
                weight < worst.weight || (weight == worst.weight && term > worst.term.as_str())
            });
            if best.len() == limit && beaten {
                continue;
            }
            best.push(Reverse(Suggestion {
                term: term.to_string(),
                weight,
            }));
            if best.len() > limit {
                best.pop();
            }
        }

        // Reverse order in the sorted vec is best-first
        best.into_sorted_vec().into_iter().map(|Reverse(s)| s).collect()
    }

    /// Term count and total term length, as if freshly built
    pub fn stats(&self) -> BuildStats {
        let mut stats = BuildStats::default();
        let mut stream = self.map.stream();
        while let Some((key, _)) = stream.next() {
            stats.term_count = stats.term_count.saturating_add(1);
            stats.total_term_length = stats
                .total_term_length
                .saturating_add(u64::try_from(key.len()).unwrap_or(u64::MAX));
        }
        stats
    }

    pub fn get(&self, term: &str) -> Option<u64> {
        self.map.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.map.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Write the automaton to `path`, replacing any previous file
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` if the file cannot be written
    pub fn persist(&self, path: &Path) -> SuggesterResult<()> {
        let bytes = self.map.as_fst().as_bytes();
        let mut contents = Vec::with_capacity(bytes.len().saturating_add(HEADER_LEN));
        contents.extend_from_slice(FILE_MAGIC);
        contents.push(FORMAT_VERSION);
        contents.extend_from_slice(bytes);

        let tmp = path.with_extension("fst.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read an automaton written by [`CompletionAutomaton::persist`]
    ///
    /// # Errors
    /// Returns `SuggesterError::Io` for unreadable files and
    /// `SuggesterError::CorruptData` for anything that is not a valid automaton
    pub fn load(path: &Path) -> SuggesterResult<Self> {
        let contents = std::fs::read(path)?;
        let (header, body) = contents
            .split_at_checked(HEADER_LEN)
            .ok_or_else(|| SuggesterError::CorruptData(format!("{} is truncated", path.display())))?;
        if header.get(..FILE_MAGIC.len()) != Some(FILE_MAGIC.as_slice()) {
            return Err(SuggesterError::CorruptData(format!(
                "{} is not a completion automaton",
                path.display()
            )));
        }
        if header.last() != Some(&FORMAT_VERSION) {
            return Err(SuggesterError::CorruptData(format!(
                "{} has unsupported format version",
                path.display()
            )));
        }

        let map = Map::new(body.to_vec())
            .map_err(|e| SuggesterError::CorruptData(format!("{}: {e}", path.display())))?;
        Ok(Self { map })
    }
}
