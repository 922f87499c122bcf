//! Schema migration registry and executor.
//!
//! # Responsibility
//! - Render schema migrations for the active dialect in strictly increasing
//!   version order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Every applied migration leaves one marker row in `SchemaVersion`.
//! - A handle whose dialect carries invariant triggers only runs against a
//!   schema that has all of them, whichever dialect provisioned the file.

use crate::db::dialect::SQLITE_INVARIANT_TRIGGER_NAMES;
use crate::db::{now_epoch_ms, DbError, DbResult, Dialect};
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};

const SCHEMA_VERSION_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS SchemaVersion (
    version INTEGER NOT NULL,
    appliedAt INTEGER NOT NULL
);";

const CORE_TABLES_SQL: &str = "
CREATE TABLE Lexicon (
    id {pk},
    name {key} NOT NULL UNIQUE,
    symbolSetName {key} NOT NULL,
    locale {key} NOT NULL
){opts};

CREATE TABLE Entry (
    id {pk},
    lexiconId {int} NOT NULL,
    strn {key} NOT NULL,
    language {key} NOT NULL,
    partOfSpeech {key} NOT NULL DEFAULT '',
    morphology {key} NOT NULL DEFAULT '',
    wordParts {key} NOT NULL DEFAULT '',
    preferred {bool} NOT NULL DEFAULT 0,
    FOREIGN KEY (lexiconId) REFERENCES Lexicon(id)
){opts};
CREATE INDEX idxEntryLexiconStrn ON Entry(lexiconId, strn);
CREATE INDEX idxEntryStrn ON Entry(strn);

CREATE TABLE Transcription (
    id {pk},
    entryId {int} NOT NULL,
    strn {key} NOT NULL,
    language {key} NOT NULL,
    sources {text} NOT NULL,
    FOREIGN KEY (entryId) REFERENCES Entry(id) ON DELETE CASCADE
){opts};
CREATE INDEX idxTranscriptionEntry ON Transcription(entryId);
CREATE INDEX idxTranscriptionStrn ON Transcription(strn);

CREATE TABLE Lemma (
    id {pk},
    strn {key} NOT NULL,
    reading {key} NOT NULL DEFAULT '',
    paradigm {key} NOT NULL DEFAULT '',
    UNIQUE (strn, reading)
){opts};

CREATE TABLE Lemma2Entry (
    lemmaId {int} NOT NULL,
    entryId {int} NOT NULL UNIQUE,
    PRIMARY KEY (lemmaId, entryId),
    FOREIGN KEY (lemmaId) REFERENCES Lemma(id) ON DELETE CASCADE,
    FOREIGN KEY (entryId) REFERENCES Entry(id) ON DELETE CASCADE
){opts};

CREATE TABLE EntryStatus (
    id {pk},
    entryId {int} NOT NULL,
    name {key} NOT NULL,
    source {key} NOT NULL,
    timestamp {int} NOT NULL,
    isCurrent {bool} NOT NULL DEFAULT 1,
    FOREIGN KEY (entryId) REFERENCES Entry(id) ON DELETE CASCADE
){opts};
CREATE INDEX idxEntryStatusEntryCurrent ON EntryStatus(entryId, isCurrent);

CREATE TABLE EntryValidation (
    id {pk},
    entryId {int} NOT NULL,
    level {key} NOT NULL,
    name {key} NOT NULL,
    message {text} NOT NULL,
    timestamp {int} NOT NULL,
    FOREIGN KEY (entryId) REFERENCES Entry(id) ON DELETE CASCADE
){opts};
CREATE INDEX idxEntryValidationEntry ON EntryValidation(entryId);

CREATE TABLE EntryComment (
    id {pk},
    entryId {int} NOT NULL,
    label {key} NOT NULL,
    source {key} NOT NULL,
    comment {text} NOT NULL,
    FOREIGN KEY (entryId) REFERENCES Entry(id) ON DELETE CASCADE
){opts};
CREATE INDEX idxEntryCommentEntry ON EntryComment(entryId);
";

const ENTRY_TAG_SQL: &str = "
CREATE TABLE EntryTag (
    id {pk},
    entryId {int} NOT NULL UNIQUE,
    tag {key} NOT NULL,
    wordForm {key} NOT NULL,
    FOREIGN KEY (entryId) REFERENCES Entry(id) ON DELETE CASCADE
){opts};
CREATE INDEX idxEntryTagWordForm ON EntryTag(wordForm, tag);
";

const LOOKUP_INDEXES_SQL: &str = "
CREATE INDEX idxEntryStatusName ON EntryStatus(name);
CREATE INDEX idxEntryValidationName ON EntryValidation(name);
";

/// One ordered schema step rendered for a dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub sql: String,
}

/// Renders every migration for `dialect`, oldest first.
pub fn migrations(dialect: &dyn Dialect) -> Vec<Migration> {
    let mut invariants = render(LOOKUP_INDEXES_SQL, dialect);
    if let Some(triggers) = dialect.invariant_triggers() {
        invariants.push_str(triggers);
    }

    vec![
        Migration {
            version: 1,
            sql: render(CORE_TABLES_SQL, dialect),
        },
        Migration {
            version: 2,
            sql: render(ENTRY_TAG_SQL, dialect),
        },
        Migration {
            version: 3,
            sql: invariants,
        },
    ]
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    3
}

/// Full provisioning script for a fresh database of `dialect`, including the
/// `SchemaVersion` marker rows.
pub fn schema_script(dialect: &dyn Dialect) -> String {
    let mut script = String::from(SCHEMA_VERSION_TABLE_SQL);
    script.push('\n');
    for migration in migrations(dialect) {
        script.push_str(&migration.sql);
        script.push_str(&format!(
            "\nINSERT INTO SchemaVersion (version, appliedAt) VALUES ({}, 0);\n",
            migration.version
        ));
    }
    script
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &Connection, dialect: &dyn Dialect) -> DbResult<()> {
    conn.execute_batch(SCHEMA_VERSION_TABLE_SQL)?;
    let current_version = current_schema_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    for migration in migrations(dialect) {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(&migration.sql)?;
        tx.execute(
            "INSERT INTO SchemaVersion (version, appliedAt) VALUES (?1, ?2);",
            params![migration.version, now_epoch_ms()],
        )?;
    }
    tx.commit()?;

    Ok(())
}

/// Installs the dialect's invariant triggers when the schema lacks any of
/// them. Returns whether anything was installed.
///
/// A file provisioned by a trigger-less dialect records the same schema
/// version, so the version check alone cannot tell.
pub fn ensure_invariant_triggers(conn: &Connection, dialect: &dyn Dialect) -> DbResult<bool> {
    let Some(triggers) = dialect.invariant_triggers() else {
        return Ok(false);
    };

    let installed = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name IN (?1, ?2, ?3);",
        params_from_iter(SQLITE_INVARIANT_TRIGGER_NAMES),
        |row| row.get::<_, usize>(0),
    )?;
    if installed == SQLITE_INVARIANT_TRIGGER_NAMES.len() {
        return Ok(false);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    tx.execute_batch(triggers)?;
    tx.commit()?;
    Ok(true)
}

/// Highest version recorded in `SchemaVersion`, or 0 for a fresh database.
pub fn current_schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM SchemaVersion;",
        [],
        |row| row.get::<_, u32>(0),
    )?;
    Ok(version)
}

fn render(template: &str, dialect: &dyn Dialect) -> String {
    template
        .replace("{pk}", dialect.primary_key())
        .replace("{int}", dialect.integer_type())
        .replace("{key}", dialect.key_text_type())
        .replace("{text}", dialect.text_type())
        .replace("{bool}", dialect.bool_type())
        .replace("{opts}", dialect.table_options())
}

#[cfg(test)]
mod tests {
    use super::{latest_version, migrations, schema_script};
    use crate::db::{MariaDbDialect, SqliteDialect};

    #[test]
    fn migrations_are_monotonic_and_end_at_latest() {
        let rendered = migrations(&SqliteDialect::new());
        let versions: Vec<u32> = rendered.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(versions.last().copied(), Some(latest_version()));
    }

    #[test]
    fn mariadb_script_uses_auto_increment_and_no_triggers() {
        let script = schema_script(&MariaDbDialect);
        assert!(script.contains("AUTO_INCREMENT"));
        assert!(script.contains("ENGINE=InnoDB"));
        assert!(!script.contains("CREATE TRIGGER"));
        assert!(!script.contains("{pk}"));
    }

    #[test]
    fn trigger_less_sqlite_omits_triggers() {
        let with = schema_script(&SqliteDialect::new());
        let without = schema_script(&SqliteDialect::without_triggers());
        assert!(with.contains("CREATE TRIGGER"));
        assert!(!without.contains("CREATE TRIGGER"));
        assert!(without.contains("AUTOINCREMENT"));
    }
}
