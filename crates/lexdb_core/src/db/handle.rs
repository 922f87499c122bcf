//! Named, shareable database handle.
//!
//! A handle owns a small pool of bootstrapped connections and lends one out
//! per call, so concurrent readers and transactions on the same database are
//! limited only by SQLite's own locking. File databases run in WAL mode so a
//! long read never blocks a writer. Registry fan-out workers clone the
//! `Arc<Database>` and call into it independently of the registry lock.

use super::open::{configure_connection, open_db_with, open_shared_memory};
use super::{DbError, DbResult, Dialect};
use log::info;
use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static NEXT_MEMORY_DATABASE: AtomicU64 = AtomicU64::new(1);

/// Pool limits for one database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Upper bound on simultaneously open connections.
    pub max_connections: u32,
    /// How long a call waits for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Applies the handle's dialect settings to every connection the pool opens.
#[derive(Debug)]
struct DialectCustomizer {
    dialect: Arc<dyn Dialect>,
}

impl CustomizeConnection<Connection, rusqlite::Error> for DialectCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        configure_connection(conn, self.dialect.as_ref())
    }
}

pub struct Database {
    name: String,
    dialect: Arc<dyn Dialect>,
    pool: Pool<SqliteConnectionManager>,
    /// Shared-cache memory databases vanish with their last connection;
    /// this one is never lent out.
    memory_anchor: Option<Mutex<Connection>>,
}

impl Database {
    /// Opens (creating if needed) a database file bound to `dialect`.
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        dialect: Arc<dyn Dialect>,
    ) -> DbResult<Self> {
        Self::open_with_options(name, path, dialect, DatabaseOptions::default())
    }

    pub fn open_with_options(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        dialect: Arc<dyn Dialect>,
        options: DatabaseOptions,
    ) -> DbResult<Self> {
        let name = name.into();
        let path = path.as_ref();
        let conn = open_db_with(path, dialect.as_ref())?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        drop(conn);

        let pool = build_pool(&name, SqliteConnectionManager::file(path), &dialect, options)?;
        Ok(Self {
            name,
            dialect,
            pool,
            memory_anchor: None,
        })
    }

    /// Opens a private in-memory database shared by this handle's pool.
    pub fn open_in_memory(name: impl Into<String>, dialect: Arc<dyn Dialect>) -> DbResult<Self> {
        Self::open_in_memory_with_options(name, dialect, DatabaseOptions::default())
    }

    pub fn open_in_memory_with_options(
        name: impl Into<String>,
        dialect: Arc<dyn Dialect>,
        options: DatabaseOptions,
    ) -> DbResult<Self> {
        let name = name.into();
        let uri = format!(
            "file:lexdb-{}-{}?mode=memory&cache=shared",
            std::process::id(),
            NEXT_MEMORY_DATABASE.fetch_add(1, Ordering::Relaxed)
        );
        let anchor = open_shared_memory(&uri, dialect.as_ref())?;

        let pool = build_pool(&name, SqliteConnectionManager::file(&uri), &dialect, options)?;
        Ok(Self {
            name,
            dialect,
            pool,
            memory_anchor: Some(Mutex::new(anchor)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Runs `f` on a connection of its own for the duration of the call.
    ///
    /// # Errors
    /// `DbError::Pool` when no connection frees up within the handle's
    /// acquire timeout; otherwise whatever `f` returns.
    pub fn with_connection<T, E>(
        &self,
        f: impl FnOnce(&Connection, &dyn Dialect) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let conn = self.pool.get().map_err(|source| DbError::Pool {
            database: self.name.clone(),
            source,
        })?;
        f(&conn, self.dialect.as_ref())
    }
}

fn build_pool(
    name: &str,
    manager: SqliteConnectionManager,
    dialect: &Arc<dyn Dialect>,
    options: DatabaseOptions,
) -> DbResult<Pool<SqliteConnectionManager>> {
    let max_connections = options.max_connections.max(1);
    let pool = Pool::builder()
        .max_size(max_connections)
        .min_idle(Some(0))
        .connection_timeout(options.acquire_timeout.max(Duration::from_millis(1)))
        .connection_customizer(Box::new(DialectCustomizer {
            dialect: Arc::clone(dialect),
        }))
        .build(manager)
        .map_err(|source| DbError::Pool {
            database: name.to_string(),
            source,
        })?;

    info!(
        "event=db_pool module=db status=ok database={} dialect={} max_connections={}",
        name,
        dialect.name(),
        max_connections
    );
    Ok(pool)
}

impl Debug for Database {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("dialect", &self.dialect.name())
            .field("in_memory", &self.memory_anchor.is_some())
            .finish()
    }
}
