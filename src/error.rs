//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache tables and the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key not present in the table
    #[error("Key not found in table '{table}'")]
    NotFound { table: String },

    /// A loader ran on a miss and produced no entry
    #[error("Loader produced no value for table '{table}'")]
    LoaderFailed { table: String },

    /// No tokio runtime available to drive expiration timers
    #[error("No tokio runtime available to schedule expiration sweeps")]
    NoRuntime,
}

impl CacheError {
    pub(crate) fn not_found(table: &str) -> Self {
        CacheError::NotFound {
            table: table.to_string(),
        }
    }

    pub(crate) fn loader_failed(table: &str) -> Self {
        CacheError::LoaderFailed {
            table: table.to_string(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
