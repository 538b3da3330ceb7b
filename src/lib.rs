//! SQLite Cache - An embeddable key-value cache
//!
//! Provides dictionary-style access with per-key TTL expiration, atomic
//! increment/decrement, batch operations and memoization, stored in SQLite
//! on disk or in shared memory.

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod memoize;
pub mod storage;

pub use cache::{Cache, CacheEntry, CacheMapping, Expiration};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, JsonCodec};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use memoize::{HashedArgs, KeyFn, KeyStrategy, Memoized};
