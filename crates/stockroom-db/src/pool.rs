//! The catalog's SQLite connection pool.
//!
//! Every pooled connection is put through [`configure_connection`]: WAL
//! journal, enforced foreign keys, `synchronous = NORMAL` and a busy timeout.
//! Catalog writes open their transaction with [`begin_write`], which takes
//! the database write lock up front. Under WAL a deferred transaction that
//! has already read cannot wait for that lock; SQLite fails the upgrade with
//! `SQLITE_BUSY` without consulting the busy timeout.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use thiserror::Error;

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits for a lock before failing, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections for a file database.
    pub pool_max_size: u32,
}

impl DbRuntimeSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool_max_size must be at least 1")]
    EmptyPool,

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Applies the catalog's per-connection settings.
///
/// In-memory databases report `memory` as their journal mode; any other
/// answer than `wal` is an error.
pub fn configure_connection(conn: &Connection, settings: &DbRuntimeSettings) -> rusqlite::Result<()> {
    conn.busy_timeout(settings.busy_timeout())?;
    conn.pragma_update(None, "foreign_keys", true)?;

    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("expected WAL journal mode, got {journal_mode}")),
        ));
    }

    conn.pragma_update(None, "synchronous", "NORMAL")
}

/// Opens a transaction that already holds the write lock.
///
/// Blocks for at most the connection's busy timeout while another writer
/// commits.
pub fn begin_write(conn: &mut Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Creates the connection pool for `db_path`.
///
/// Each `:memory:` connection is a separate database, so a memory pool is
/// capped at one connection regardless of `pool_max_size`.
///
/// # Errors
///
/// Returns `PoolError::EmptyPool` for a zero `pool_max_size`, and
/// `PoolError::PoolInit` if the first connection cannot be opened and
/// configured.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    if settings.pool_max_size == 0 {
        return Err(PoolError::EmptyPool);
    }
    let max_size = if db_path == MEMORY_PATH {
        1
    } else {
        settings.pool_max_size
    };

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| configure_connection(conn, &settings));

    let pool = Pool::builder().max_size(max_size).build(manager)?;

    tracing::debug!(
        path = db_path,
        pool_max_size = max_size,
        busy_timeout_ms = settings.busy_timeout_ms,
        "sqlite pool ready"
    );

    Ok(pool)
}
