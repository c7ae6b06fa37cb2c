//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

/// Boxed error type returned by change handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// == Cache Error Enum ==
/// Unified error type for all cache operations.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An alternate key is already bound to a different entry in the same cache
    #[error(
        "Alternate key '{alt_key}' for entry '{key}' in cache '{value_type}' \
         is already bound to entry '{existing_key}'"
    )]
    AlternateKeyConflict {
        /// The conflicting alternate key
        alt_key: String,
        /// The entry that tried to claim the alternate key
        key: String,
        /// The cache's value-type
        value_type: String,
        /// The entry the alternate key is already bound to
        existing_key: String,
    },

    /// Invalid argument data (empty key, oversized key, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A fetch was forced but no usable entry getter is available
    #[error("Entry fetch for cache '{value_type}' was forced but no entry getter is available")]
    NoEntryGetter {
        /// The cache's value-type
        value_type: String,
    },

    /// One or more change handlers failed during dispatch
    #[error("{failed} of {invoked} change handlers failed: {}", .messages.join("; "))]
    HandlerFailures {
        /// Number of handlers that returned an error
        failed: usize,
        /// Number of handlers invoked for the dispatch
        invoked: usize,
        /// Collected handler error messages
        messages: Vec<String>,
    },
}

// == Result Type Alias ==
/// Convenience Result type for the cache library.
pub type Result<T> = std::result::Result<T, CacheError>;
