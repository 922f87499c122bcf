use lexdb_core::db::{open_db_in_memory_with, SqliteDialect};
use lexdb_core::{
    Entry, EntryRepository, EntryStatus, EntryValidation, ErrorKind, LexiconRepository,
    NewLexicon, Query, RepoError, SqliteEntryRepository, SqliteLexiconRepository,
};
use rusqlite::Connection;

fn lexicon(name: &str) -> NewLexicon {
    NewLexicon::new(name, "sv-se_ws-sampa", "sv_SE")
}

fn words_in(repo: &SqliteEntryRepository<'_>, lexicon: &str) -> Vec<String> {
    repo.search(&Query::all_in([lexicon]))
        .unwrap()
        .into_iter()
        .map(|entry| entry.strn)
        .collect()
}

fn with_each_dialect(test: impl Fn(&Connection, &SqliteDialect)) {
    for dialect in [SqliteDialect::new(), SqliteDialect::without_triggers()] {
        let conn = open_db_in_memory_with(&dialect).unwrap();
        test(&conn, &dialect);
    }
}

#[test]
fn create_and_list_lexicons() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let repo = SqliteLexiconRepository::new(&conn);

    let created = repo.create_lexicon(&lexicon("sv")).unwrap();
    repo.create_lexicon(&lexicon("en")).unwrap();

    assert!(created.id > 0);
    assert_eq!(created.symbol_set_name, "sv-se_ws-sampa");
    let names: Vec<String> = repo
        .list_lexicons()
        .unwrap()
        .into_iter()
        .map(|lexicon| lexicon.name)
        .collect();
    assert_eq!(names, vec!["en", "sv"]);
    assert_eq!(repo.lexicon_by_name("sv").unwrap(), Some(created));
    assert_eq!(repo.lexicon_by_name("fi").unwrap(), None);
}

#[test]
fn duplicate_and_invalid_names_are_rejected() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let repo = SqliteLexiconRepository::new(&conn);
    repo.create_lexicon(&lexicon("sv")).unwrap();

    let duplicate = repo.create_lexicon(&lexicon("sv")).unwrap_err();
    assert!(matches!(duplicate, RepoError::DuplicateLexicon(ref name) if name == "sv"));
    assert_eq!(duplicate.kind(), ErrorKind::InvariantViolation);

    for bad in ["", "  ", "db:sv"] {
        assert!(matches!(
            repo.create_lexicon(&lexicon(bad)).unwrap_err(),
            RepoError::InvalidLexiconName(_)
        ));
    }
}

#[test]
fn rename_keeps_entries_attached() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let lexicons = SqliteLexiconRepository::new(&conn);
    let entries = SqliteEntryRepository::new(&conn);
    lexicons.create_lexicon(&lexicon("sv")).unwrap();
    lexicons.create_lexicon(&lexicon("taken")).unwrap();
    entries
        .insert_entry("sv", &Entry::new("älg", "sv", "\"E l j"))
        .unwrap();

    assert!(matches!(
        lexicons.rename_lexicon("sv", "taken").unwrap_err(),
        RepoError::DuplicateLexicon(_)
    ));

    let renamed = lexicons.rename_lexicon("sv", "sv_main").unwrap();
    assert_eq!(renamed.name, "sv_main");
    assert_eq!(words_in(&entries, "sv_main"), vec!["älg"]);
    assert!(matches!(
        lexicons.rename_lexicon("sv", "other").unwrap_err(),
        RepoError::LexiconNotFound(_)
    ));
}

#[test]
fn only_empty_lexicons_can_be_deleted() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let lexicons = SqliteLexiconRepository::new(&conn);
    let entries = SqliteEntryRepository::new(&conn);
    lexicons.create_lexicon(&lexicon("sv")).unwrap();
    lexicons.create_lexicon(&lexicon("scratch")).unwrap();
    entries
        .insert_entries(
            "sv",
            &[Entry::new("mus", "sv", "\"m u: s"), Entry::new("råtta", "sv", "\"r O t a")],
        )
        .unwrap();

    let err = lexicons.delete_lexicon("sv").unwrap_err();
    assert!(matches!(
        err,
        RepoError::LexiconNotEmpty { ref name, entries: 2 } if name == "sv"
    ));
    assert_eq!(lexicons.entry_count("sv").unwrap(), 2);

    lexicons.delete_lexicon("scratch").unwrap();
    assert_eq!(lexicons.lexicon_by_name("scratch").unwrap(), None);
    assert!(matches!(
        lexicons.delete_lexicon("scratch").unwrap_err(),
        RepoError::LexiconNotFound(_)
    ));
}

#[test]
fn move_new_entries_moves_only_missing_orthographies() {
    with_each_dialect(|conn, dialect| {
        let lexicons = SqliteLexiconRepository::with_dialect(conn, dialect);
        let entries = SqliteEntryRepository::with_dialect(conn, dialect);
        lexicons.create_lexicon(&lexicon("incoming")).unwrap();
        lexicons.create_lexicon(&lexicon("main")).unwrap();

        let mut x = Entry::new("x", "sv", "\"e k s");
        x.status = Some(EntryStatus::new("imported", "nst"));
        let mut y = x.clone();
        y.strn = "y".to_string();
        entries.insert_entries("incoming", &[x.clone(), y]).unwrap();
        entries.insert_entry("main", &x).unwrap();

        let mut moved_status = EntryStatus::new("moved", "admin");
        moved_status.timestamp = 1_700_000_000_000;
        let report = lexicons
            .move_new_entries("incoming", "main", &moved_status)
            .unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(words_in(&entries, "incoming"), vec!["x"]);
        assert_eq!(words_in(&entries, "main"), vec!["x", "y"]);

        let moved = entries
            .search(
                &Query {
                    words: vec!["y".to_string()],
                    ..Query::default()
                }
                .in_lexicon("main"),
            )
            .unwrap()
            .remove(0);
        let status = moved.status.unwrap();
        assert_eq!(status.name, "moved");
        assert_eq!(status.timestamp, 1_700_000_000_000);

        let history = entries.status_history(moved.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|status| status.current).count(), 1);

        let again = lexicons
            .move_new_entries("incoming", "main", &moved_status)
            .unwrap();
        assert_eq!(again.moved, 0);
    });
}

#[test]
fn move_between_unknown_lexicons_is_not_found() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let lexicons = SqliteLexiconRepository::new(&conn);
    lexicons.create_lexicon(&lexicon("main")).unwrap();

    let err = lexicons
        .move_new_entries("ghost", "main", &EntryStatus::new("moved", "admin"))
        .unwrap_err();
    assert!(matches!(err, RepoError::LexiconNotFound(ref name) if name == "ghost"));
}

#[test]
fn status_frequencies_count_current_statuses() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let lexicons = SqliteLexiconRepository::new(&conn);
    let entries = SqliteEntryRepository::new(&conn);
    lexicons.create_lexicon(&lexicon("sv")).unwrap();

    let with_status = |word: &str, status: &str| {
        let mut entry = Entry::new(word, "sv", format!("\"{word}"));
        entry.status = Some(EntryStatus::new(status, "nst"));
        entry
    };
    let ids = entries
        .insert_entries(
            "sv",
            &[
                with_status("ett", "imported"),
                with_status("två", "imported"),
                with_status("tre", "ok"),
            ],
        )
        .unwrap();
    let mut reviewed = entries.get_entry(ids[0]).unwrap().unwrap();
    reviewed.status = Some(EntryStatus::new("ok", "reviewer"));
    entries.update_entry(&reviewed).unwrap();

    let frequencies = lexicons.status_frequencies("sv").unwrap();
    assert_eq!(frequencies.get("imported"), Some(&1));
    assert_eq!(frequencies.get("ok"), Some(&2));
    assert_eq!(frequencies.len(), 2);
}

#[test]
fn persisted_validation_stats_aggregate_stored_findings() {
    let conn = lexdb_core::open_db_in_memory().unwrap();
    let lexicons = SqliteLexiconRepository::new(&conn);
    let entries = SqliteEntryRepository::new(&conn);
    lexicons.create_lexicon(&lexicon("sv")).unwrap();

    let mut flagged = Entry::new("fyra", "sv", "\"f y: r a");
    flagged.validations = vec![
        EntryValidation::new("Warning", "stress", "no secondary stress"),
        EntryValidation::new("Fatal", "symbol", "unknown symbol"),
    ];
    let mut also_flagged = Entry::new("fem", "sv", "\"f E m");
    also_flagged.validations = vec![EntryValidation::new("Warning", "stress", "odd stress")];
    entries
        .insert_entries(
            "sv",
            &[flagged, also_flagged, Entry::new("sex", "sv", "\"s E k s")],
        )
        .unwrap();

    let stats = lexicons.persisted_validation_stats("sv").unwrap();
    assert_eq!(stats.validated_entries, 3);
    assert_eq!(stats.entries_with_findings, 2);
    assert_eq!(stats.total_findings, 3);
    assert_eq!(stats.by_level.get("Warning"), Some(&2));
    assert_eq!(stats.rule_count("stress", "Warning"), 2);
    assert_eq!(stats.rule_count("symbol", "Fatal"), 1);
}
