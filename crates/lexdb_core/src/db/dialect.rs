//! SQL dialect strategy.
//!
//! # Responsibility
//! - Hide every textual difference between supported SQL flavors (synthetic
//!   key syntax, column types, table options, trigger availability).
//! - Tell the entry writer which invariants the database enforces itself.
//!
//! # Invariants
//! - Exactly one dialect is bound to a database handle, chosen at open time.
//! - An invariant reported as not trigger-backed must be enforced by the
//!   writer inside the same transaction.

use super::regexp::register_regexp;
use rusqlite::Connection;
use std::fmt::Debug;

/// Operations that differ textually between SQL backends.
pub trait Dialect: Debug + Send + Sync {
    /// Short stable name, used in logs and CLI flags.
    fn name(&self) -> &'static str;

    /// Whether the embedded SQLite driver can execute this dialect.
    fn embedded(&self) -> bool;

    /// Column definition for synthetic auto-increment ids.
    fn primary_key(&self) -> &'static str;

    /// Column type for foreign keys, counts and epoch-ms timestamps.
    fn integer_type(&self) -> &'static str;

    /// Column type for short, indexable strings.
    fn key_text_type(&self) -> &'static str;

    /// Column type for free text.
    fn text_type(&self) -> &'static str;

    fn bool_type(&self) -> &'static str;

    /// Suffix appended after each `CREATE TABLE (...)`.
    fn table_options(&self) -> &'static str;

    /// DDL for the "one preferred per wordform" and "one current status"
    /// triggers, or `None` when the backend has no trigger support.
    fn invariant_triggers(&self) -> Option<&'static str>;

    /// Infix operator used for free-form pattern filters.
    fn regexp_operator(&self) -> &'static str {
        "REGEXP"
    }

    /// Registers connection-scoped functions the dialect's SQL relies on.
    fn register_functions(&self, _conn: &Connection) -> rusqlite::Result<()> {
        Ok(())
    }

    /// Whether inserting/updating `preferred = 1` clears other homographs
    /// without application help.
    fn enforces_single_preferred(&self) -> bool {
        self.invariant_triggers().is_some()
    }

    /// Whether inserting a current status row demotes the previous one
    /// without application help.
    fn enforces_single_current_status(&self) -> bool {
        self.invariant_triggers().is_some()
    }
}

/// Names of the triggers in [`Dialect::invariant_triggers`] for SQLite.
pub const SQLITE_INVARIANT_TRIGGER_NAMES: [&str; 3] = [
    "entryPreferredInsert",
    "entryPreferredUpdate",
    "entryStatusCurrentInsert",
];

const SQLITE_INVARIANT_TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS entryPreferredInsert
AFTER INSERT ON Entry
WHEN NEW.preferred = 1
BEGIN
    UPDATE Entry
    SET preferred = 0
    WHERE lexiconId = NEW.lexiconId
      AND strn = NEW.strn
      AND id <> NEW.id
      AND preferred = 1;
END;

CREATE TRIGGER IF NOT EXISTS entryPreferredUpdate
AFTER UPDATE OF preferred ON Entry
WHEN NEW.preferred = 1
BEGIN
    UPDATE Entry
    SET preferred = 0
    WHERE lexiconId = NEW.lexiconId
      AND strn = NEW.strn
      AND id <> NEW.id
      AND preferred = 1;
END;

CREATE TRIGGER IF NOT EXISTS entryStatusCurrentInsert
AFTER INSERT ON EntryStatus
WHEN NEW.isCurrent = 1
BEGIN
    UPDATE EntryStatus
    SET isCurrent = 0
    WHERE entryId = NEW.entryId
      AND id <> NEW.id
      AND isCurrent = 1;
END;
";

/// Dialect used by handles opened without an explicit choice.
pub(crate) static DEFAULT_DIALECT: SqliteDialect = SqliteDialect::new();

/// Embedded SQLite dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteDialect {
    triggers: bool,
}

impl SqliteDialect {
    pub const fn new() -> Self {
        Self { triggers: true }
    }

    /// SQLite built without trigger support (`SQLITE_OMIT_TRIGGER`), or a
    /// deployment that forbids triggers. Invariants move into the writer.
    pub const fn without_triggers() -> Self {
        Self { triggers: false }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        if self.triggers {
            "sqlite"
        } else {
            "sqlite-no-triggers"
        }
    }

    fn embedded(&self) -> bool {
        true
    }

    fn primary_key(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn integer_type(&self) -> &'static str {
        "INTEGER"
    }

    fn key_text_type(&self) -> &'static str {
        "TEXT"
    }

    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    fn bool_type(&self) -> &'static str {
        "INTEGER"
    }

    fn table_options(&self) -> &'static str {
        ""
    }

    fn invariant_triggers(&self) -> Option<&'static str> {
        if self.triggers {
            Some(SQLITE_INVARIANT_TRIGGERS)
        } else {
            None
        }
    }

    fn register_functions(&self, conn: &Connection) -> rusqlite::Result<()> {
        register_regexp(conn)
    }
}

/// MariaDB/MySQL dialect. Only its schema script is produced here; the
/// embedded driver refuses to open it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MariaDbDialect;

impl Dialect for MariaDbDialect {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn embedded(&self) -> bool {
        false
    }

    fn primary_key(&self) -> &'static str {
        "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY"
    }

    fn integer_type(&self) -> &'static str {
        "BIGINT"
    }

    fn key_text_type(&self) -> &'static str {
        "VARCHAR(255)"
    }

    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    fn bool_type(&self) -> &'static str {
        "TINYINT(1)"
    }

    fn table_options(&self) -> &'static str {
        " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin"
    }

    fn invariant_triggers(&self) -> Option<&'static str> {
        None
    }
}
