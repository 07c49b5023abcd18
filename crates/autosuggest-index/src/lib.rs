//! Index read abstraction consumed by the autosuggest engine
//!
//! The suggester never writes to the search index. It needs a term dictionary
//! per field, postings with positions, and a way to evaluate the rest of the
//! user's query to a set of documents. [`IndexReader`] is that contract;
//! [`MemoryIndex`] is an implementation for small corpora and tests.

pub mod error;
mod eval;
pub mod memory;
pub mod query;
pub mod reader;
pub mod tokenizer;

pub use error::{IndexError, IndexResult};
pub use memory::{FULL_FIELD, MemoryIndex, MemoryIndexBuilder, PATH_FIELD};
pub use query::{BooleanClause, Occur, PhraseQuery, Query, Term};
pub use reader::{DocId, DocSet, IndexReader, Posting, PositionMap, TermEntry};
pub use tokenizer::Tokenizer;
