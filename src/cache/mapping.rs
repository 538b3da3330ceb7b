//! Mapping-style access
//!
//! Index-like operations over a cache. Unlike [`Cache::get`], reading an
//! absent or expired key through [`CacheMapping::get_item`] is an error.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::Cache;
use crate::codec::Codec;
use crate::error::{CacheError, Result};

/// Dictionary-style access to a cache.
pub trait CacheMapping {
    /// Returns the live value for `key`, or [`CacheError::KeyNotFound`].
    fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<T>;

    /// Stores `value` under `key` with the default timeout.
    fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()>;

    /// Removes `key` if present.
    fn delete_item(&self, key: &str) -> Result<()>;

    /// Returns true if `key` holds a live entry.
    fn contains(&self, key: &str) -> Result<bool>;
}

impl<C: Codec> CacheMapping for Cache<C> {
    fn get_item<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get(key)?.ok_or(CacheError::KeyNotFound)
    }

    fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_timeout())
    }

    fn delete_item(&self, key: &str) -> Result<()> {
        self.delete(key).map(|_| ())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Cache::contains(self, key)
    }
}
