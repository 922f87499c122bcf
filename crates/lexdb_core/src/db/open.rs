//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas and dialect functions.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.
//! - Returned connections have the dialect's invariant triggers installed.

use super::migrations::{apply_migrations, ensure_invariant_triggers};
use super::{DbError, DbResult, Dialect, SqliteDialect};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens a SQLite database file with the default trigger-backed dialect.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with(path, &SqliteDialect::new())
}

/// Opens an in-memory SQLite database with the default dialect.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db_in_memory_with(&SqliteDialect::new())
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with(path: impl AsRef<Path>, dialect: &dyn Dialect) -> DbResult<Connection> {
    open_with_mode("file", dialect, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory_with(dialect: &dyn Dialect) -> DbResult<Connection> {
    open_with_mode("memory", dialect, Connection::open_in_memory)
}

/// Opens a named shared-cache in-memory database from a `file:` URI, so
/// several connections can reach the same data.
pub(crate) fn open_shared_memory(uri: &str, dialect: &dyn Dialect) -> DbResult<Connection> {
    open_with_mode("shared_memory", dialect, || Connection::open(uri))
}

fn open_with_mode(
    mode: &str,
    dialect: &dyn Dialect,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode={} dialect={}",
        mode,
        dialect.name()
    );

    if !dialect.embedded() {
        error!(
            "event=db_open module=db status=error mode={} dialect={} error_code=dialect_not_embedded",
            mode,
            dialect.name()
        );
        return Err(DbError::UnsupportedDialect(dialect.name()));
    }

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, dialect) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} dialect={} duration_ms={}",
                mode,
                dialect.name(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &Connection, dialect: &dyn Dialect) -> DbResult<()> {
    configure_connection(conn, dialect)?;
    apply_migrations(conn, dialect)?;
    if ensure_invariant_triggers(conn, dialect)? {
        warn!(
            "event=db_open module=db status=repaired dialect={} detail=invariant_triggers_installed",
            dialect.name()
        );
    }
    Ok(())
}

/// Settings every connection needs, including ones handed out by a pool
/// after the schema is already in place.
pub(crate) fn configure_connection(
    conn: &Connection,
    dialect: &dyn Dialect,
) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    dialect.register_functions(conn)
}
