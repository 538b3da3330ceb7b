//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key cannot be stored (empty, too long, or contains NUL)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Indexed access on an absent or expired key
    #[error("Key not in cache.")]
    KeyNotFound,

    /// incr/decr on an absent or expired key
    #[error("Nonexistent or expired cache key.")]
    NonexistentKey,

    /// incr/decr on a value that does not decode as an integer
    #[error("Value is not a number.")]
    NotANumber,

    /// incr/decr result does not fit in an i64
    #[error("Numeric overflow")]
    Overflow,

    /// Operation on a cache that has been closed
    #[error("Cache is closed")]
    Closed,

    /// Value could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] serde_json::Error),

    /// Error reported by SQLite
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
