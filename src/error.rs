//! Error types for the aggregation engine.
//!
//! Engine operations return [`EngineError`]; the application layers wrap
//! everything in `anyhow` with context.

use thiserror::Error;

/// Errors raised by the aggregation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The age-group selector is not one of `60+`, `75+`, `90+`.
    #[error("invalid age group selection: {0:?} (expected one of 60+, 75+, 90+)")]
    InvalidSelector(String),

    /// A required column was not supplied by the loader.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// The record sequence handed to the engine was empty.
    #[error("no records to aggregate")]
    EmptyInput,
}

/// Result alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
