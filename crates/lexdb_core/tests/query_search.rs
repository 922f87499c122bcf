use lexdb_core::db::open_db_in_memory;
use lexdb_core::{
    Entry, EntryComment, EntryRepository, EntryStatus, EntryValidation, ErrorKind,
    LexiconRepository, NewLexicon, Query, QueryError, RepoError, SqliteEntryRepository,
    SqliteLexiconRepository, Transcription,
};
use rusqlite::Connection;

fn seeded() -> Connection {
    let conn = open_db_in_memory().unwrap();
    let lexicons = SqliteLexiconRepository::new(&conn);
    lexicons
        .create_lexicon(&NewLexicon::new("sv", "sv-se_ws-sampa", "sv_SE"))
        .unwrap();
    lexicons
        .create_lexicon(&NewLexicon::new("nb", "nb-no_ws-sampa", "nb_NO"))
        .unwrap();

    let entries = SqliteEntryRepository::new(&conn);
    let words = ["katt", "kanin", "hund", "häst", "kalv"];
    let batch: Vec<Entry> = words
        .iter()
        .map(|word| {
            let mut entry = Entry::new(*word, "sv", format!("\"{word}"));
            entry.status = Some(EntryStatus::new("imported", "nst"));
            entry
        })
        .collect();
    entries.insert_entries("sv", &batch).unwrap();
    entries
        .insert_entry("nb", &Entry::new("katt", "nb", "\"k a t"))
        .unwrap();
    conn
}

fn words(entries: &[Entry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.strn.as_str()).collect()
}

#[test]
fn empty_query_is_rejected() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);

    let err = repo.search(&Query::default().in_lexicon("sv")).unwrap_err();
    assert!(matches!(err, RepoError::Query(QueryError::Empty)));
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
}

#[test]
fn content_filter_without_lexicon_is_rejected() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);
    let query = Query {
        words: vec!["katt".to_string()],
        ..Query::default()
    };
    assert!(matches!(
        repo.search(&query).unwrap_err(),
        RepoError::Query(QueryError::NoLexicon)
    ));
}

#[test]
fn unknown_lexicon_is_not_found() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);

    let err = repo.search(&Query::all_in(["sv", "fi"])).unwrap_err();
    assert!(matches!(err, RepoError::LexiconNotFound(ref name) if name == "fi"));
}

#[test]
fn word_filter_is_scoped_to_lexicons() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);

    let query = Query {
        words: vec!["katt".to_string()],
        ..Query::default()
    };
    let swedish = repo.search(&query.clone().in_lexicon("sv")).unwrap();
    assert_eq!(swedish.len(), 1);
    assert_eq!(swedish[0].language, "sv");

    let both = repo
        .search(&query.in_lexicon("sv").in_lexicon("nb"))
        .unwrap();
    assert_eq!(both.len(), 2);
}

#[test]
fn regexp_and_like_filters_match_orthography() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);

    let by_regexp = Query {
        word_regexp: Some("^ka".to_string()),
        ..Query::default()
    }
    .in_lexicon("sv");
    assert_eq!(words(&repo.search(&by_regexp).unwrap()), vec!["katt", "kanin", "kalv"]);

    let by_like = Query {
        word_like: Some("h%".to_string()),
        ..Query::default()
    }
    .in_lexicon("sv");
    assert_eq!(words(&repo.search(&by_like).unwrap()), vec!["hund", "häst"]);
}

#[test]
fn invalid_regexp_is_reported_before_execution() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);
    let query = Query {
        word_regexp: Some("(".to_string()),
        ..Query::default()
    }
    .in_lexicon("sv");

    assert!(matches!(
        repo.search(&query).unwrap_err(),
        RepoError::Query(QueryError::InvalidRegexp { .. })
    ));
}

#[test]
fn paging_counts_entries_not_joined_rows() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);

    let ids = repo.entry_ids(&Query::all_in(["sv"])).unwrap();
    let first = ids[..2].to_vec();
    let mut fat = repo.get_entry(first[0]).unwrap().unwrap();
    fat.transcriptions.push(Transcription::new("\"k a t:", "sv"));
    fat.comments = vec![
        EntryComment::new("a", "x", "one"),
        EntryComment::new("b", "x", "two"),
    ];
    repo.update_entry(&fat).unwrap();

    let page_zero = repo
        .search(&Query::all_in(["sv"]).with_paging(0, 2))
        .unwrap();
    assert_eq!(page_zero.len(), 2);
    assert_eq!(
        page_zero.iter().map(|entry| entry.id).collect::<Vec<_>>(),
        first
    );

    let page_two = repo
        .search(&Query::all_in(["sv"]).with_paging(2, 2))
        .unwrap();
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0].id, ids[4]);

    assert_eq!(
        repo.count(&Query::all_in(["sv"]).with_paging(0, 2)).unwrap(),
        5
    );
}

#[test]
fn joined_children_are_not_duplicated() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);

    let mut entry = Entry::new("lejon", "sv", "l e \"j u: n");
    entry
        .transcriptions
        .push(Transcription::new("\"l e: j O n", "sv"));
    entry.comments = vec![
        EntryComment::new("a", "x", "one"),
        EntryComment::new("b", "x", "two"),
        EntryComment::new("c", "x", "three"),
    ];
    entry.validations = vec![
        EntryValidation::new("Warning", "stress", "double stress"),
        EntryValidation::new("Info", "loan", "loanword"),
    ];
    let id = repo.insert_entry("sv", &entry).unwrap();

    let found = repo.search(&Query::by_ids([id])).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].transcriptions.len(), 2);
    assert_eq!(found[0].comments.len(), 3);
    assert_eq!(found[0].validations.len(), 2);
    assert_eq!(found[0].comments, entry.comments);
}

#[test]
fn entries_by_word_groups_homographs() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);
    repo.insert_entry("sv", &Entry::new("katt", "sv", "\"k a t:"))
        .unwrap();

    let query = Query {
        words: vec!["katt".to_string(), "hund".to_string()],
        ..Query::default()
    }
    .in_lexicon("sv");
    let grouped = repo.entries_by_word(&query).unwrap();

    assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["hund", "katt"]);
    assert_eq!(grouped["katt"].len(), 2);
    assert_eq!(grouped["hund"].len(), 1);
}

#[test]
fn status_filter_matches_current_status_only() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);
    let hund = repo
        .search(
            &Query {
                words: vec!["hund".to_string()],
                ..Query::default()
            }
            .in_lexicon("sv"),
        )
        .unwrap()
        .remove(0);

    let mut reviewed = hund.clone();
    reviewed.status = Some(EntryStatus::new("ok", "reviewer"));
    repo.update_entry(&reviewed).unwrap();

    let status = |name: &str| {
        Query {
            statuses: vec![name.to_string()],
            ..Query::default()
        }
        .in_lexicon("sv")
    };
    assert_eq!(words(&repo.search(&status("ok")).unwrap()), vec!["hund"]);
    assert_eq!(repo.count(&status("imported")).unwrap(), 4);
}

#[test]
fn by_ids_needs_no_lexicon() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);
    let ids = repo.entry_ids(&Query::all_in(["nb"])).unwrap();
    assert_eq!(ids.len(), 1);

    let found = repo.search(&Query::by_ids(ids.clone())).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ids[0]);
    assert_eq!(found[0].language, "nb");

    assert!(repo.search(&Query::by_ids([9_999])).unwrap().is_empty());
}

#[test]
fn search_each_streams_into_closure_sink() {
    let conn = seeded();
    let repo = SqliteEntryRepository::new(&conn);
    let mut seen = Vec::new();
    let mut sink = lexdb_core::repo::FnSink(|entry: Entry| -> lexdb_core::RepoResult<()> {
        seen.push(entry.strn);
        Ok(())
    });

    let delivered = repo.search_each(&Query::all_in(["sv"]), &mut sink).unwrap();
    drop(sink);

    assert_eq!(delivered, 5);
    assert_eq!(seen, vec!["katt", "kanin", "hund", "häst", "kalv"]);
}
