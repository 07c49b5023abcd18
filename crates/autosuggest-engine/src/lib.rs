//! Autosuggest engine crate
//!
//! Completes partially typed query terms from per-project completion
//! automatons, biased by how often terms were searched before. Plain prefixes
//! are answered from the automaton; phrase and boolean queries are scored
//! against the documents matching the rest of the query.

pub mod automaton;
pub mod engine;
pub mod error;
pub mod merger;
pub mod popularity;
pub mod query;
pub mod searcher;
pub mod shard;

// Re-export main types
pub use automaton::{CompletionAutomaton, Suggestion};
pub use engine::{NamedIndex, PROJECTS_DISABLED_KEY, SuggesterEngine, Suggestions};
pub use error::{SuggesterError, SuggesterResult};
pub use merger::{LookupResultItem, combine_results};
pub use popularity::PopularityStore;
pub use query::{RangeBound, SuggesterQuery};
pub use searcher::ComplexQuerySearcher;
pub use shard::{ShardData, ShardReadGuard, ShardState};
