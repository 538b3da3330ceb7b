//! Storage Module
//!
//! SQLite-backed entry store. Owns the connection and hands out
//! transaction-scoped [`Entries`] to the cache engine.

mod entries;
pub mod schema;

use std::thread;
use std::time::{Duration, Instant};

use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use tracing::{debug, info, instrument};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

pub use entries::Entries;

/// Longest pause between two attempts on a locked shared-cache table
const MAX_LOCK_BACKOFF: Duration = Duration::from_millis(20);

// == Entry Store ==
/// An open cache database.
#[derive(Debug)]
pub struct EntryStore {
    conn: Connection,
    /// How long to keep retrying while another connection holds a lock
    lock_timeout: Duration,
}

impl EntryStore {
    /// Opens the database described by `config`, applying pragmas and
    /// creating the schema if needed.
    #[instrument(skip(config), fields(connection = %config.connection_string()))]
    pub fn open(config: &CacheConfig) -> Result<Self> {
        let lock_timeout = Duration::from_millis(config.busy_timeout_ms);
        let conn = Connection::open(config.open_target())?;
        retry_while_locked(Instant::now() + lock_timeout, || {
            schema::apply_connection_pragmas(&conn, config)?;
            schema::create_schema(&conn)
        })?;

        info!(in_memory = config.in_memory, "Cache store opened");
        Ok(Self { conn, lock_timeout })
    }

    /// Runs `f` inside one immediate transaction.
    ///
    /// The transaction commits if `f` returns Ok and rolls back otherwise.
    /// Connections sharing an in-memory database report table locks as
    /// `SQLITE_LOCKED`, which the busy handler never waits on, so the whole
    /// transaction is rolled back and run again until the busy timeout runs
    /// out. `f` may therefore be called more than once.
    pub fn transaction<T, F>(&mut self, mut f: F) -> Result<T>
    where
        F: FnMut(&Entries<'_>) -> Result<T>,
    {
        let deadline = Instant::now() + self.lock_timeout;
        let conn = &mut self.conn;
        retry_while_locked(deadline, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&Entries::new(&tx))?;
            tx.commit()?;
            Ok(out)
        })
    }

    /// Closes the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, err)| CacheError::Storage(err))
    }
}

// == Lock Retry ==
/// Runs `attempt` until it stops failing with a table lock or `deadline`
/// passes, backing off exponentially in between.
fn retry_while_locked<T, F>(deadline: Instant, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = Duration::from_micros(100);
    let mut retries = 0u32;
    loop {
        match attempt() {
            Err(err) if is_locked(&err) && Instant::now() < deadline => {
                retries += 1;
                thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_LOCK_BACKOFF);
            }
            result => {
                if retries > 0 {
                    debug!(retries, "Shared cache lock released");
                }
                return result;
            }
        }
    }
}

fn is_locked(err: &CacheError) -> bool {
    matches!(
        err,
        CacheError::Storage(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == ErrorCode::DatabaseLocked
    )
}
