//! Storage bootstrap, SQL dialects and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for lexicon storage.
//! - Select exactly one [`Dialect`] per database handle.
//! - Hand out pooled connections so one handle serves concurrent callers.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Applied schema versions are recorded as rows in `SchemaVersion`.
//! - Core code must not read/write lexicon data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod dialect;
mod handle;
pub mod migrations;
mod open;
mod regexp;

pub(crate) use dialect::DEFAULT_DIALECT;
pub use dialect::{Dialect, MariaDbDialect, SqliteDialect};
pub use handle::{Database, DatabaseOptions};
pub use open::{open_db, open_db_in_memory, open_db_in_memory_with, open_db_with};
pub use regexp::{regexp_cache_len, regexp_is_match};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Dialect cannot be executed by the embedded driver.
    UnsupportedDialect(&'static str),
    /// No pooled connection could be obtained for the named database.
    Pool {
        database: String,
        source: r2d2::Error,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::UnsupportedDialect(name) => write!(
                f,
                "dialect `{name}` cannot be opened by the embedded driver; use its schema script instead"
            ),
            Self::Pool { database, source } => {
                write!(f, "no connection available for database `{database}`: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::UnsupportedDialect(_) => None,
            Self::Pool { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
