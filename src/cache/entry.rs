//! Cache Entry Module
//!
//! Defines the structure for individual stored entries with TTL support.

use chrono::{DateTime, Utc};

use crate::cache::expiry::{self, Expiration};

// == Cache Entry ==
/// A row as physically stored, live or not.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The key the entry is stored under
    pub key: String,
    /// Codec-encoded value
    pub value: Vec<u8>,
    /// When the entry stops being live
    pub expires_at: Expiration,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry that expires `timeout` seconds after `now`.
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `value` - The encoded value
    /// * `timeout` - Seconds until expiry; negative never expires
    /// * `now` - Time of the write
    pub fn new(key: String, value: Vec<u8>, timeout: i64, now: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            expires_at: expiry::compute_expiration(now, timeout),
        }
    }

    // == Is Live ==
    /// Checks if the entry is readable at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        expiry::is_live(self.expires_at, now)
    }

    // == Time To Live ==
    /// Returns the entry's TTL in seconds at `now`.
    ///
    /// `-1` if it never expires, `-2` if it has expired.
    pub fn ttl(&self, now: DateTime<Utc>) -> i64 {
        expiry::ttl(self.expires_at, now)
    }
}
