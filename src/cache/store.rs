//! Cache Store Module
//!
//! Main cache engine combining the SQLite entry store with TTL expiration.
//! Every operation runs as one transaction while holding the store lock, so
//! check-then-write sequences cannot interleave with other callers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::expiry::{self, TTL_MISSING};
use crate::cache::{CacheEntry, MAX_KEY_LENGTH};
use crate::clock::{Clock, SystemClock};
use crate::codec::{Codec, JsonCodec};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::storage::{Entries, EntryStore};

// == Cache ==
/// An embeddable key-value cache with per-key expiration.
#[derive(Debug)]
pub struct Cache<C = JsonCodec> {
    /// Open store, None once closed
    store: Mutex<Option<EntryStore>>,
    clock: Arc<dyn Clock>,
    codec: C,
    config: CacheConfig,
}

impl Cache<JsonCodec> {
    // == Constructor ==
    /// Opens a cache with JSON values and the system clock.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with(config, JsonCodec, Arc::new(SystemClock))
    }

    /// Opens a cache, runs `f` against it, and closes it again.
    ///
    /// The cache is released whether `f` succeeds, fails, or panics.
    pub fn scoped<T, F>(config: CacheConfig, f: F) -> Result<T>
    where
        F: FnOnce(&Cache) -> Result<T>,
    {
        let cache = Cache::open(config)?;
        let result = f(&cache);
        let closed = cache.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl<C: Codec> Cache<C> {
    /// Opens a cache with an explicit codec and clock.
    pub fn open_with(config: CacheConfig, codec: C, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = EntryStore::open(&config)?;
        Ok(Self {
            store: Mutex::new(Some(store)),
            clock,
            codec,
            config,
        })
    }

    /// Returns the configuration the cache was opened with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the connection string in the persisted format.
    pub fn connection_string(&self) -> String {
        self.config.connection_string()
    }

    /// Timeout used by operations that do not take one.
    pub fn default_timeout(&self) -> i64 {
        self.config.default_timeout
    }

    // == Get ==
    /// Retrieves a live value, or None if the key is absent or expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        let entry = self.with_entries(|entries, now| {
            Ok(entries.get_raw(key)?.filter(|entry| entry.is_live(now)))
        })?;
        entry
            .map(|entry| self.codec.decode(&entry.value))
            .transpose()
    }

    /// Retrieves a live value, or `default` if the key is absent or expired.
    pub fn get_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns true if `key` holds a live entry.
    pub fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.with_entries(|entries, now| {
            Ok(entries
                .get_raw(key)?
                .is_some_and(|entry| entry.is_live(now)))
        })
    }

    // == Set ==
    /// Stores a value unconditionally, replacing any existing entry.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `timeout` - Seconds until expiry; negative never expires, zero expires immediately
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, timeout: i64) -> Result<()> {
        validate_key(key)?;
        let bytes = self.codec.encode(value)?;
        self.with_entries(|entries, now| {
            entries.put(key, &bytes, expiry::compute_expiration(now, timeout))
        })
    }

    // == Add ==
    /// Stores a value only if the key is absent or expired.
    ///
    /// Returns true if the value was written.
    pub fn add<T: Serialize + ?Sized>(&self, key: &str, value: &T, timeout: i64) -> Result<bool> {
        validate_key(key)?;
        let bytes = self.codec.encode(value)?;
        self.with_entries(|entries, now| add_entry(entries, key, &bytes, timeout, now))
    }

    // == Update ==
    /// Replaces the value of a live entry.
    ///
    /// With `timeout` None the entry keeps its current expiration. Returns
    /// false without writing if the key is absent or expired.
    pub fn update<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        timeout: Option<i64>,
    ) -> Result<bool> {
        validate_key(key)?;
        let bytes = self.codec.encode(value)?;
        self.with_entries(|entries, now| update_entry(entries, key, &bytes, timeout, now))
    }

    // == Delete ==
    /// Removes an entry. Returns whether a row was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.with_entries(|entries, _| entries.delete(key))
    }

    // == Get Or Set ==
    /// Returns the live value for `key`, or stores and returns `default`.
    pub fn get_or_set<T>(&self, key: &str, default: T, timeout: i64) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        validate_key(key)?;
        let bytes = self.codec.encode(&default)?;
        let existing = self.with_entries(|entries, now| {
            match entries.get_raw(key)?.filter(|entry| entry.is_live(now)) {
                Some(entry) => Ok(Some(entry.value)),
                None => {
                    entries.put(key, &bytes, expiry::compute_expiration(now, timeout))?;
                    Ok(None)
                }
            }
        })?;
        match existing {
            Some(stored) => self.codec.decode(&stored),
            None => Ok(default),
        }
    }

    // == Touch ==
    /// Resets the expiration of a live entry without changing its value.
    ///
    /// Returns false if the key is absent or expired.
    pub fn touch(&self, key: &str, timeout: i64) -> Result<bool> {
        validate_key(key)?;
        self.with_entries(|entries, now| touch_entry(entries, key, timeout, now))
    }

    // == Incr / Decr ==
    /// Adds `delta` to a live integer value and returns the result.
    ///
    /// The entry keeps its original expiration.
    pub fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.adjust(key, |value| value.checked_add(delta))
    }

    /// Subtracts `delta` from a live integer value and returns the result.
    ///
    /// The entry keeps its original expiration.
    pub fn decr(&self, key: &str, delta: i64) -> Result<i64> {
        self.adjust(key, |value| value.checked_sub(delta))
    }

    fn adjust<F>(&self, key: &str, op: F) -> Result<i64>
    where
        F: Fn(i64) -> Option<i64>,
    {
        validate_key(key)?;
        self.with_entries(|entries, now| {
            let entry = entries
                .get_raw(key)?
                .filter(|entry| entry.is_live(now))
                .ok_or(CacheError::NonexistentKey)?;
            let current: i64 = self
                .codec
                .decode(&entry.value)
                .map_err(|_| CacheError::NotANumber)?;
            let next = op(current).ok_or(CacheError::Overflow)?;
            entries.put(key, &self.codec.encode(&next)?, entry.expires_at)?;
            Ok(next)
        })
    }

    // == TTL ==
    /// Returns the remaining seconds before `key` expires.
    ///
    /// `-1` if it never expires, `-2` if it is absent or expired.
    pub fn ttl(&self, key: &str) -> Result<i64> {
        validate_key(key)?;
        self.with_entries(|entries, now| {
            Ok(entries
                .get_raw(key)?
                .map_or(TTL_MISSING, |entry| entry.ttl(now)))
        })
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) -> Result<()> {
        let removed = self.with_entries(|entries, _| entries.clear())?;
        debug!(removed, "Cache cleared");
        Ok(())
    }

    // == Purge Expired ==
    /// Removes all expired entries now instead of waiting for them to be
    /// overwritten.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.with_entries(|entries, now| entries.purge_expired(now))?;
        debug!(removed, "Purged expired entries");
        Ok(removed)
    }

    // == Batch Operations ==
    /// Retrieves the live subset of `keys`. Absent and expired keys are omitted.
    pub fn get_many<K, T>(&self, keys: &[K]) -> Result<HashMap<String, T>>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        validate_keys(keys)?;
        let found = self.with_entries(|entries, now| {
            let mut live = entries.get_many_raw(keys)?;
            live.retain(|entry| entry.is_live(now));
            Ok(live)
        })?;
        found
            .into_iter()
            .map(|entry| -> Result<(String, T)> {
                Ok((entry.key, self.codec.decode(&entry.value)?))
            })
            .collect()
    }

    /// Stores every pair unconditionally with the same timeout.
    pub fn set_many<I, K, T>(&self, items: I, timeout: i64) -> Result<()>
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
        T: Serialize,
    {
        let encoded = self.encode_items(items)?;
        self.with_entries(|entries, now| {
            let batch: Vec<CacheEntry> = encoded
                .iter()
                .map(|(key, value)| CacheEntry::new(key.clone(), value.clone(), timeout, now))
                .collect();
            entries.put_many(&batch)
        })
    }

    /// Applies [`Cache::add`] to every pair. Returns how many were written.
    pub fn add_many<I, K, T>(&self, items: I, timeout: i64) -> Result<usize>
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
        T: Serialize,
    {
        let encoded = self.encode_items(items)?;
        self.with_entries(|entries, now| {
            let mut written = 0;
            for (key, value) in &encoded {
                if add_entry(entries, key, value, timeout, now)? {
                    written += 1;
                }
            }
            Ok(written)
        })
    }

    /// Applies [`Cache::update`] to every pair. Returns how many were written.
    pub fn update_many<I, K, T>(&self, items: I, timeout: Option<i64>) -> Result<usize>
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
        T: Serialize,
    {
        let encoded = self.encode_items(items)?;
        self.with_entries(|entries, now| {
            let mut written = 0;
            for (key, value) in &encoded {
                if update_entry(entries, key, value, timeout, now)? {
                    written += 1;
                }
            }
            Ok(written)
        })
    }

    /// Removes every one of `keys`. Returns how many rows were removed.
    pub fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize> {
        validate_keys(keys)?;
        self.with_entries(|entries, _| entries.delete_many(keys))
    }

    /// Applies [`Cache::touch`] to every key. Returns how many were touched.
    pub fn touch_many<K: AsRef<str>>(&self, keys: &[K], timeout: i64) -> Result<usize> {
        validate_keys(keys)?;
        self.with_entries(|entries, now| {
            let mut touched = 0;
            for key in keys {
                if touch_entry(entries, key.as_ref(), timeout, now)? {
                    touched += 1;
                }
            }
            Ok(touched)
        })
    }

    /// Returns the TTL of every one of `keys`, `-2` for absent or expired ones.
    pub fn ttl_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, i64>> {
        validate_keys(keys)?;
        self.with_entries(|entries, now| {
            let mut ttls: HashMap<String, i64> = keys
                .iter()
                .map(|key| (key.as_ref().to_string(), TTL_MISSING))
                .collect();
            for entry in entries.get_many_raw(keys)? {
                let ttl = entry.ttl(now);
                ttls.insert(entry.key, ttl);
            }
            Ok(ttls)
        })
    }

    // == Lifetime ==
    /// Releases the underlying connection. Later operations fail with
    /// [`CacheError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let store = self.store.lock().take();
        match store {
            Some(store) => {
                store.close()?;
                info!(connection = %self.config.connection_string(), "Cache closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Returns true once [`Cache::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.store.lock().is_none()
    }

    // == Internals ==
    /// Runs `f` in one transaction under the store lock, with the time read
    /// once the transaction has begun.
    ///
    /// `f` is run again if the transaction has to be retried.
    fn with_entries<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&Entries<'_>, DateTime<Utc>) -> Result<T>,
    {
        let mut guard = self.store.lock();
        let store = guard.as_mut().ok_or(CacheError::Closed)?;
        store.transaction(|entries| f(entries, self.clock.now()))
    }

    fn encode_items<I, K, T>(&self, items: I) -> Result<Vec<(String, Vec<u8>)>>
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
        T: Serialize,
    {
        items
            .into_iter()
            .map(|(key, value)| -> Result<(String, Vec<u8>)> {
                let key = key.as_ref();
                validate_key(key)?;
                Ok((key.to_string(), self.codec.encode(&value)?))
            })
            .collect()
    }
}

// == Conditional Writes ==
fn add_entry(
    entries: &Entries<'_>,
    key: &str,
    value: &[u8],
    timeout: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    if entries.get_raw(key)?.is_some_and(|entry| entry.is_live(now)) {
        debug!(key, "add skipped, key is live");
        return Ok(false);
    }
    entries.put(key, value, expiry::compute_expiration(now, timeout))?;
    Ok(true)
}

fn update_entry(
    entries: &Entries<'_>,
    key: &str,
    value: &[u8],
    timeout: Option<i64>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let Some(entry) = entries.get_raw(key)?.filter(|entry| entry.is_live(now)) else {
        debug!(key, "update skipped, key is absent or expired");
        return Ok(false);
    };
    let expires_at = timeout.map_or(entry.expires_at, |timeout| {
        expiry::compute_expiration(now, timeout)
    });
    entries.put(key, value, expires_at)?;
    Ok(true)
}

fn touch_entry(entries: &Entries<'_>, key: &str, timeout: i64, now: DateTime<Utc>) -> Result<bool> {
    if !entries.get_raw(key)?.is_some_and(|entry| entry.is_live(now)) {
        debug!(key, "touch skipped, key is absent or expired");
        return Ok(false);
    }
    entries.set_expiration(key, expiry::compute_expiration(now, timeout))
}

// == Key Validation ==
/// Rejects keys the store cannot hold: empty, too long, or containing NUL.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.contains('\0') {
        return Err(CacheError::InvalidKey(
            "Key must not contain NUL characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_keys<K: AsRef<str>>(keys: &[K]) -> Result<()> {
    keys.iter().try_for_each(|key| validate_key(key.as_ref()))
}
