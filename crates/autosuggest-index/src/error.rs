//! Error types for the autosuggest-index crate

use autosuggest_common::{CommonError, impl_common_conversions};
use thiserror::Error;

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised while reading or evaluating queries against an index
#[derive(Error, Debug)]
pub enum IndexError {
    /// The field is not indexed
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Structurally invalid query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// General I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document decoding errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl IndexError {
    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }
}

impl CommonError for IndexError {
    fn io_error(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    fn other_error(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl_common_conversions!(IndexError);
