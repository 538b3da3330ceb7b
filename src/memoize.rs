//! Memoization Module
//!
//! Wraps a deterministic function so repeated calls with the same arguments
//! are answered from the cache.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::Cache;
use crate::codec::{Codec, JsonCodec};
use crate::error::Result;

/// Derives the cache key for one call of a memoized function.
///
/// Implementations must be deterministic, and distinct argument values must
/// map to distinct keys.
pub trait KeyStrategy<A> {
    fn derive(&self, function: &str, args: &A) -> Result<String>;
}

/// Hashes the function name and the JSON-encoded arguments with blake3.
///
/// Arguments pass through `serde_json::Value` first, so map keys are encoded
/// in sorted order and equal `HashMap` arguments hash the same. Sequences keep
/// their iteration order; pass sets as `BTreeSet` or use [`KeyFn`].
///
/// Keys look like `memoize:<64 hex chars>` regardless of argument size. The
/// function name is part of the hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashedArgs;

impl<A: Serialize> KeyStrategy<A> for HashedArgs {
    fn derive(&self, function: &str, args: &A) -> Result<String> {
        let encoded = serde_json::to_vec(&serde_json::to_value(args)?)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(function.as_bytes());
        hasher.update(&[0]);
        hasher.update(&encoded);
        Ok(format!("memoize:{}", hex::encode(hasher.finalize().as_bytes())))
    }
}

/// A caller-supplied key function.
///
/// The returned string is prefixed with the function name so two memoized
/// functions never share keys.
#[derive(Debug, Clone, Copy)]
pub struct KeyFn<F>(pub F);

impl<A, F> KeyStrategy<A> for KeyFn<F>
where
    F: Fn(&A) -> String,
{
    fn derive(&self, function: &str, args: &A) -> Result<String> {
        Ok(format!("memoize:{}:{}", function, (self.0)(args)))
    }
}

// == Memoized ==
/// A function whose results are stored in a [`Cache`].
pub struct Memoized<'c, F, K = HashedArgs, C = JsonCodec> {
    cache: &'c Cache<C>,
    name: String,
    timeout: i64,
    func: F,
    keys: K,
}

impl<'c, F, K, C: Codec> Memoized<'c, F, K, C> {
    /// Stores results with `timeout` seconds instead of the cache default.
    pub fn with_timeout(mut self, timeout: i64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the key strategy.
    pub fn with_keys<K2>(self, keys: K2) -> Memoized<'c, F, K2, C> {
        Memoized {
            cache: self.cache,
            name: self.name,
            timeout: self.timeout,
            func: self.func,
            keys,
        }
    }

    /// Returns the cache key a call with `args` would use.
    pub fn key_for<A>(&self, args: &A) -> Result<String>
    where
        K: KeyStrategy<A>,
    {
        self.keys.derive(&self.name, args)
    }

    /// Returns the cached result for `args`, or calls the function and
    /// caches what it returns.
    pub fn call<A, R>(&self, args: A) -> Result<R>
    where
        F: Fn(A) -> R,
        K: KeyStrategy<A>,
        R: Serialize + DeserializeOwned,
    {
        let key = self.key_for(&args)?;
        if let Some(hit) = self.cache.get::<R>(&key)? {
            debug!(function = %self.name, key = %key, "memoize hit");
            return Ok(hit);
        }

        let value = (self.func)(args);
        self.cache.set(&key, &value, self.timeout)?;
        Ok(value)
    }
}

impl<C: Codec> Cache<C> {
    /// Wraps `func` so its results are cached under keys derived from `name`
    /// and the call arguments.
    ///
    /// Results use the cache's default timeout unless
    /// [`Memoized::with_timeout`] overrides it.
    ///
    /// # Example
    /// ```no_run
    /// # use sqlite_cache::{Cache, CacheConfig};
    /// let cache = Cache::open(CacheConfig::default())?;
    /// let add = cache.memoize("add", |(a, b): (i64, i64)| a + b);
    /// assert_eq!(add.call((1, 2))?, 3);
    /// # Ok::<(), sqlite_cache::CacheError>(())
    /// ```
    pub fn memoize<F>(&self, name: impl Into<String>, func: F) -> Memoized<'_, F, HashedArgs, C> {
        Memoized {
            cache: self,
            name: name.into(),
            timeout: self.default_timeout(),
            func,
            keys: HashedArgs,
        }
    }
}
