//! Configuration Module
//!
//! Handles cache construction parameters, loaded from defaults or environment variables.

use std::env;
use std::path::PathBuf;

/// Suffix appended to the file path of an in-memory cache's connection string.
pub const IN_MEMORY_SUFFIX: &str = ":?mode=memory&cache=shared";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache file name
    pub filename: String,
    /// Directory the file lives in; current directory if None
    pub path: Option<PathBuf>,
    /// Keep the database in shared memory instead of on disk
    pub in_memory: bool,
    /// Timeout in seconds used when the caller does not pass one
    pub default_timeout: i64,
    /// Maximum bytes set aside for memory-mapped I/O
    pub memory_map_size: u64,
    /// Maximum number of pages SQLite keeps in memory
    pub cache_size: i64,
    /// WAL length in pages that triggers an automatic checkpoint
    pub wal_max_pages: i64,
    /// How long to wait on a locked database, in milliseconds
    pub busy_timeout_ms: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_FILENAME` - Cache file name (default: ".cache")
    /// - `CACHE_PATH` - Directory for the cache file (default: unset)
    /// - `CACHE_IN_MEMORY` - Keep data in memory; accepts 1/0, true/false,
    ///   yes/no, on/off in any case (default: true)
    /// - `CACHE_DEFAULT_TIMEOUT` - Default timeout in seconds (default: 300)
    /// - `CACHE_MMAP_SIZE` - Memory map size in bytes (default: 64 MiB)
    /// - `CACHE_SIZE_PAGES` - Page cache size (default: 8192)
    /// - `CACHE_WAL_MAX_PAGES` - WAL autocheckpoint threshold (default: 1000)
    /// - `CACHE_BUSY_TIMEOUT_MS` - Busy timeout in milliseconds (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filename: env::var("CACHE_FILENAME").unwrap_or(defaults.filename),
            path: env::var("CACHE_PATH").ok().map(PathBuf::from).or(defaults.path),
            in_memory: env::var("CACHE_IN_MEMORY")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.in_memory),
            default_timeout: env_parsed("CACHE_DEFAULT_TIMEOUT")
                .unwrap_or(defaults.default_timeout),
            memory_map_size: env_parsed("CACHE_MMAP_SIZE").unwrap_or(defaults.memory_map_size),
            cache_size: env_parsed("CACHE_SIZE_PAGES").unwrap_or(defaults.cache_size),
            wal_max_pages: env_parsed("CACHE_WAL_MAX_PAGES").unwrap_or(defaults.wal_max_pages),
            busy_timeout_ms: env_parsed("CACHE_BUSY_TIMEOUT_MS")
                .unwrap_or(defaults.busy_timeout_ms),
        }
    }

    /// Creates an on-disk configuration for the given file path.
    pub fn on_disk(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            in_memory: false,
            ..Self::default()
        }
    }

    /// Creates an in-memory configuration with the given shared name.
    pub fn in_memory(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            in_memory: true,
            ..Self::default()
        }
    }

    /// Returns the file path: `filename` joined onto `path` when one is set.
    pub fn filepath(&self) -> String {
        match &self.path {
            Some(dir) => dir.join(&self.filename).to_string_lossy().into_owned(),
            None => self.filename.clone(),
        }
    }

    /// Returns the connection string in the cache's persisted format.
    ///
    /// In-memory caches carry the `:?mode=memory&cache=shared` suffix, on-disk
    /// caches are the bare file path.
    pub fn connection_string(&self) -> String {
        if self.in_memory {
            format!("{}{}", self.filepath(), IN_MEMORY_SUFFIX)
        } else {
            self.filepath()
        }
    }

    /// Returns the target handed to SQLite when opening the database.
    pub(crate) fn open_target(&self) -> String {
        if self.in_memory {
            format!("file:{}?mode=memory&cache=shared", self.filepath())
        } else {
            self.filepath()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            filename: ".cache".to_string(),
            path: None,
            in_memory: true,
            default_timeout: 300,
            memory_map_size: 1 << 26,
            cache_size: 1 << 13,
            wal_max_pages: 1000,
            busy_timeout_ms: 5000,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Parses the boolean spellings accepted in environment variables.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
