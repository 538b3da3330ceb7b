//! Schema and pragma management
//!
//! Creates the cache table and applies per-connection pragmas.

use std::time::Duration;

use rusqlite::Connection;

use crate::config::CacheConfig;
use crate::error::Result;

pub(crate) const CREATE_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS cache (key TEXT PRIMARY KEY, value BLOB, exp FLOAT)";

pub(crate) const CREATE_INDEX_SQL: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS cache_key ON cache(key)";

/// Apply connection-level pragmas
///
/// - Memory-mapped I/O sized from the config
/// - WAL mode with the configured autocheckpoint threshold
/// - Page cache size from the config
/// - NORMAL synchronous mode
/// - FULL auto vacuum, set before the table exists so it takes effect
/// - Busy timeout for lock contention between connections
pub fn apply_connection_pragmas(conn: &Connection, config: &CacheConfig) -> Result<()> {
    let pragma_sql = format!(
        "PRAGMA mmap_size={};\n\
         PRAGMA journal_mode=WAL;\n\
         PRAGMA wal_autocheckpoint={};\n\
         PRAGMA cache_size={};\n\
         PRAGMA synchronous=NORMAL;\n\
         PRAGMA auto_vacuum=FULL;\n",
        config.memory_map_size, config.wal_max_pages, config.cache_size
    );
    conn.execute_batch(&pragma_sql)?;

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

    Ok(())
}

/// Create the cache table and its key index if they do not exist.
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!("{};\n{};", CREATE_TABLE_SQL, CREATE_INDEX_SQL))?;
    Ok(())
}
