use lexdb_core::db::migrations::{ensure_invariant_triggers, latest_version};
use lexdb_core::db::{
    open_db, open_db_in_memory, open_db_in_memory_with, open_db_with, DbError, MariaDbDialect,
    SqliteDialect,
};
use lexdb_core::{
    Entry, EntryRepository, EntryStatus, LexiconRepository, NewLexicon, SqliteEntryRepository,
    SqliteLexiconRepository,
};
use rusqlite::Connection;

const TABLES: [&str; 10] = [
    "SchemaVersion",
    "Lexicon",
    "Entry",
    "Transcription",
    "Lemma",
    "Lemma2Entry",
    "EntryStatus",
    "EntryValidation",
    "EntryComment",
    "EntryTag",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in TABLES {
        assert_table_exists(&conn, table);
    }
    assert_eq!(trigger_count(&conn), 3);
}

#[test]
fn every_migration_leaves_a_marker_row() {
    let conn = open_db_in_memory().unwrap();
    let versions: Vec<u32> = conn
        .prepare("SELECT version FROM SchemaVersion ORDER BY version;")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lexicon.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let markers: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM SchemaVersion;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(markers, 3);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE SchemaVersion (version INTEGER NOT NULL, appliedAt INTEGER NOT NULL);
         INSERT INTO SchemaVersion (version, appliedAt) VALUES (999, 0);",
    )
    .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn trigger_less_dialect_creates_no_triggers() {
    let conn = open_db_in_memory_with(&SqliteDialect::without_triggers()).unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_eq!(trigger_count(&conn), 0);
    assert_table_exists(&conn, "EntryTag");
}

#[test]
fn trigger_dialect_installs_triggers_missing_from_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("provisioned_without_triggers.db");

    let conn = open_db_with(&path, &SqliteDialect::without_triggers()).unwrap();
    assert_eq!(trigger_count(&conn), 0);
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(trigger_count(&conn), 3);
    assert!(!ensure_invariant_triggers(&conn, &SqliteDialect::new()).unwrap());

    SqliteLexiconRepository::new(&conn)
        .create_lexicon(&NewLexicon::new("sv", "sv-se_ws-sampa", "sv_SE"))
        .unwrap();
    let entries = SqliteEntryRepository::new(&conn);
    let mut homograph = Entry::new("w", "sv", "\"v e:");
    homograph.preferred = true;
    homograph.status = Some(EntryStatus::new("imported", "nst"));
    let ids = entries
        .insert_entries("sv", &[homograph.clone(), homograph])
        .unwrap();
    let mut reviewed = entries.get_entry(ids[0]).unwrap().unwrap();
    reviewed.status = Some(EntryStatus::new("ok", "reviewer"));
    entries.update_entry(&reviewed).unwrap();

    let preferred: i64 = conn
        .query_row("SELECT COUNT(*) FROM Entry WHERE preferred = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    let current: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM EntryStatus WHERE entryId = ?1 AND isCurrent = 1;",
            [ids[0]],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(preferred, 1);
    assert_eq!(current, 1);
}

#[test]
fn mariadb_dialect_is_rejected_by_embedded_driver() {
    let dir = tempfile::tempdir().unwrap();
    let err = open_db_with(dir.path().join("server.db"), &MariaDbDialect).unwrap_err();
    assert!(matches!(err, DbError::UnsupportedDialect("mariadb")));
}

#[test]
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO Entry (lexiconId, strn, language) VALUES (42, 'orphan', 'sv');",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM SchemaVersion;",
        [],
        |row| row.get(0),
    )
    .unwrap()
}

fn trigger_count(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger';",
        [],
        |row| row.get(0),
    )
    .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
