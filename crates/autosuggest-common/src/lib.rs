//! Common utilities and patterns shared across Autosuggest crates
//!
//! This crate provides shared functionality to reduce duplication across
//! the suggester components: error conversions, correlation ids for tracing
//! searches across shards, and subscriber installation.

pub mod correlation;
pub mod error;
pub mod logging;

pub use correlation::CorrelationId;
pub use error::CommonError;
pub use logging::{LogFormat, init_tracing};
