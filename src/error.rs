//! Crate-wide error types.
//!
//! Request-path rejections (capacity/quota/queue-full/expired/...) are data,
//! not errors: they travel as `ScheduleResult::reason` strings, never as
//! `CoreError`. This enum is reserved for admin-path and bootstrap failures.

use thiserror::Error;

/// Result type used throughout the crate for fallible admin/store/config paths.
pub type CoreResult<T> = Result<T, CoreError>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The backing store (mapping/quota/rule repository) failed.
    #[error("store error: {0}")]
    Store(String),

    /// A priority value fell outside `[0, L-1]`.
    #[error("invalid priority {priority}: must be in [0, {max})")]
    InvalidPriority { priority: u32, max: u32 },

    /// A weights vector did not have exactly `L` entries.
    #[error("invalid weights: expected {expected} entries, got {actual}")]
    InvalidWeights { expected: usize, actual: usize },

    /// A regex pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration (TOML/INI) failed to parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<ini::Error> for CoreError {
    fn from(err: ini::Error) -> Self {
        CoreError::Config(err.to_string())
    }
}
