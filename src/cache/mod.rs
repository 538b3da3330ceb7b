//! Cache Module
//!
//! Provides the cache engine with TTL expiration on top of the SQLite entry store.

mod entry;
pub mod expiry;
mod mapping;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use expiry::{Expiration, TTL_MISSING, TTL_NEVER};
pub use mapping::CacheMapping;
pub use store::Cache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
