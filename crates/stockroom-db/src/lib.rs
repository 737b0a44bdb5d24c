//! Database layer for Stockroom.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every catalog table is created through a
//! versioned migration managed by this crate.
//!
//! WAL mode lets history readers run alongside the single writer that applies
//! a product update, and a reader only ever sees a committed transaction.
//! Writers serialize through [`begin_write`].

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{
    begin_write, configure_connection, create_pool, DbPool, DbRuntimeSettings, PoolError,
    MEMORY_PATH,
};
