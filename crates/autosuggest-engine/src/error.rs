//! Error types for the suggester engine

use autosuggest_common::{CommonError, impl_common_conversions};
use autosuggest_config::ConfigError;
use autosuggest_index::IndexError;
use thiserror::Error;

/// Result type alias for suggester operations
pub type SuggesterResult<T> = Result<T, SuggesterError>;

/// Suggester-specific error types
#[derive(Error, Debug)]
pub enum SuggesterError {
    /// Filesystem errors while persisting or loading shard data
    #[error("I/O error: {0}")]
    Io(String),

    /// Building or decoding a completion automaton failed
    #[error("Automaton error: {0}")]
    Automaton(String),

    /// Persisted data exists but cannot be decoded
    #[error("Corrupt suggester data: {0}")]
    CorruptData(String),

    /// Search counts are only tracked for terms the automaton knows
    #[error("Unknown term '{term}' in field {field}")]
    UnknownTerm { field: String, term: String },

    /// Popularity store is full until the next resize
    #[error("Popularity store for field {field} is full ({capacity} entries)")]
    CapacityExceeded { field: String, capacity: u64 },

    /// Only items with the same phrase can be combined
    #[error("Cannot combine '{left}' with '{right}'")]
    PhraseMismatch { left: String, right: String },

    /// Suggester query could not be built
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Index reader failure
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Rejected configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The engine is shutting down
    #[error("Suggester is terminating")]
    Terminated,

    /// A worker task panicked or was aborted
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl CommonError for SuggesterError {
    fn io_error(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    fn parse_error(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }

    fn other_error(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl_common_conversions!(SuggesterError, with_serde);

impl From<fst::Error> for SuggesterError {
    fn from(e: fst::Error) -> Self {
        Self::Automaton(e.to_string())
    }
}

impl From<ConfigError> for SuggesterError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SuggesterError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskFailed(e.to_string())
    }
}
