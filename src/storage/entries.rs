//! Entry operations
//!
//! Point and bulk access to the cache table. Liveness is not checked here;
//! the cache engine applies the expiration policy on top.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::{CacheEntry, Expiration};
use crate::error::Result;

const GET_SQL: &str = "SELECT value, exp FROM cache WHERE key = ?1";

const PUT_SQL: &str = "INSERT INTO cache (key, value, exp) VALUES (?1, ?2, ?3) \
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, exp = excluded.exp";

const DELETE_SQL: &str = "DELETE FROM cache WHERE key = ?1";

const SET_EXP_SQL: &str = "UPDATE cache SET exp = ?2 WHERE key = ?1";

const CLEAR_SQL: &str = "DELETE FROM cache";

const PURGE_SQL: &str = "DELETE FROM cache WHERE exp IS NOT NULL AND exp <= ?1";

// == Entries ==
/// Entry operations bound to one open transaction.
pub struct Entries<'c> {
    conn: &'c Connection,
}

impl<'c> Entries<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Returns the stored entry for `key`, expired or not.
    pub fn get_raw(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entry = self
            .conn
            .query_row(GET_SQL, params![key], |row| {
                Ok(CacheEntry {
                    key: key.to_string(),
                    value: row.get(0)?,
                    expires_at: Expiration::from_column(row.get(1)?),
                })
            })
            .optional()?;
        Ok(entry)
    }

    /// Returns the stored entries for whichever of `keys` exist.
    pub fn get_many_raw<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(GET_SQL)?;
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let row = stmt
                .query_row(params![key], |row| {
                    Ok(CacheEntry {
                        key: key.to_string(),
                        value: row.get(0)?,
                        expires_at: Expiration::from_column(row.get(1)?),
                    })
                })
                .optional()?;
            found.extend(row);
        }
        Ok(found)
    }

    /// Upserts an entry, replacing whatever was stored under its key.
    pub fn put(&self, key: &str, value: &[u8], expires_at: Expiration) -> Result<()> {
        self.conn
            .execute(PUT_SQL, params![key, value, expires_at.to_column()])?;
        Ok(())
    }

    /// Upserts every entry.
    pub fn put_many(&self, entries: &[CacheEntry]) -> Result<()> {
        let mut stmt = self.conn.prepare(PUT_SQL)?;
        for entry in entries {
            stmt.execute(params![entry.key, entry.value, entry.expires_at.to_column()])?;
        }
        Ok(())
    }

    /// Removes `key`. Returns whether a row was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.conn.execute(DELETE_SQL, params![key])? > 0)
    }

    /// Removes every one of `keys` that exists. Returns the number removed.
    pub fn delete_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize> {
        let mut stmt = self.conn.prepare(DELETE_SQL)?;
        let mut removed = 0;
        for key in keys {
            removed += stmt.execute(params![key.as_ref()])?;
        }
        Ok(removed)
    }

    /// Rewrites only the expiration marker of `key`.
    pub fn set_expiration(&self, key: &str, expires_at: Expiration) -> Result<bool> {
        Ok(self
            .conn
            .execute(SET_EXP_SQL, params![key, expires_at.to_column()])?
            > 0)
    }

    /// Removes all entries. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute(CLEAR_SQL, [])?)
    }

    /// Removes entries whose expiration is at or before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = Expiration::At(now).to_column();
        Ok(self.conn.execute(PURGE_SQL, params![cutoff])?)
    }

    /// Returns the number of stored rows, live or not.
    #[cfg(test)]
    pub(crate) fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
