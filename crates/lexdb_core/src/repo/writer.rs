//! Entry writer: insert and diff-based update inside a caller's transaction.
//!
//! # Invariants
//! - Functions here never open or commit transactions; callers wrap them in
//!   exactly one write transaction so any error discards every sub-write.
//! - At most one entry per (lexicon, strn) has `preferred = 1`.
//! - At most one status row per entry has `isCurrent = 1`.
//! - Each entry has at most one tag row; homographs never share a tag.
//! - Invariants the dialect does not enforce by trigger are enforced here.

use super::error::{RepoError, RepoResult};
use super::scan::{scan_entries, SingleEntry};
use crate::db::{now_epoch_ms, Dialect};
use crate::model::entry::{
    Entry, EntryComment, EntryId, EntryStatus, EntryValidation, Lemma, Transcription,
};
use crate::model::lexicon::LexiconId;
use crate::query::{compile_entry_query, Query};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

/// Loads one entry aggregate by id, within the caller's transaction.
pub(crate) fn load_entry(
    conn: &Connection,
    dialect: &dyn Dialect,
    entry_id: EntryId,
) -> RepoResult<Option<Entry>> {
    let compiled = compile_entry_query(&Query::by_ids([entry_id]), dialect)?;
    let mut single = SingleEntry::default();
    scan_entries(conn, &compiled, &mut single)?;
    Ok(single.0)
}

/// Inserts one validated entry with all owned children and returns its id.
pub(crate) fn insert_entry(
    conn: &Connection,
    dialect: &dyn Dialect,
    lexicon_id: LexiconId,
    entry: &Entry,
) -> RepoResult<EntryId> {
    entry.validate()?;

    if entry.preferred && !dialect.enforces_single_preferred() {
        clear_preferred(conn, lexicon_id, &entry.strn, None)?;
    }

    conn.execute(
        "INSERT INTO Entry (
            lexiconId,
            strn,
            language,
            partOfSpeech,
            morphology,
            wordParts,
            preferred
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            lexicon_id,
            entry.strn,
            entry.language,
            entry.part_of_speech,
            entry.morphology,
            entry.word_parts,
            bool_to_int(entry.preferred),
        ],
    )?;
    let entry_id = conn.last_insert_rowid();

    insert_transcriptions(conn, entry_id, &entry.transcriptions)?;
    if let Some(lemma) = &entry.lemma {
        link_lemma(conn, entry_id, lemma)?;
    }
    if let Some(tag) = &entry.tag {
        bind_tag(conn, lexicon_id, entry_id, &entry.strn, tag)?;
    }
    if let Some(status) = &entry.status {
        append_status(conn, dialect, entry_id, status)?;
    }
    insert_validations(conn, entry_id, &entry.validations)?;
    insert_comments(conn, entry_id, &entry.comments)?;

    Ok(entry_id)
}

/// Diffs `incoming` against the stored copy and writes only changed parts.
/// Returns the stored entry as re-read after the writes, and whether
/// anything was written.
pub(crate) fn update_entry(
    conn: &Connection,
    dialect: &dyn Dialect,
    incoming: &Entry,
) -> RepoResult<(Entry, bool)> {
    let stored =
        load_entry(conn, dialect, incoming.id)?.ok_or(RepoError::EntryNotFound(incoming.id))?;

    if incoming.strn != stored.strn {
        return Err(RepoError::ImmutableField {
            entry_id: stored.id,
            field: "strn",
        });
    }
    if incoming.lexicon_id != 0 && incoming.lexicon_id != stored.lexicon_id {
        return Err(RepoError::ImmutableField {
            entry_id: stored.id,
            field: "lexicon_id",
        });
    }
    incoming.validate()?;

    let mut changed = Vec::new();
    let columns = [
        ("language", &stored.language, &incoming.language),
        ("partOfSpeech", &stored.part_of_speech, &incoming.part_of_speech),
        ("morphology", &stored.morphology, &incoming.morphology),
        ("wordParts", &stored.word_parts, &incoming.word_parts),
    ];
    for (column, old, new) in columns {
        if old != new {
            conn.execute(
                &format!("UPDATE Entry SET {column} = ?1 WHERE id = ?2;"),
                params![new, stored.id],
            )?;
            changed.push(column);
        }
    }

    if incoming.preferred != stored.preferred {
        set_preferred(conn, dialect, &stored, incoming.preferred)?;
        changed.push("preferred");
    }

    if lemma_changed(stored.lemma.as_ref(), incoming.lemma.as_ref()) {
        match &incoming.lemma {
            Some(lemma) => link_lemma(conn, stored.id, lemma)?,
            None => {
                conn.execute("DELETE FROM Lemma2Entry WHERE entryId = ?1;", [stored.id])?;
            }
        }
        changed.push("lemma");
    }

    if incoming.tag != stored.tag {
        conn.execute("DELETE FROM EntryTag WHERE entryId = ?1;", [stored.id])?;
        if let Some(tag) = &incoming.tag {
            bind_tag(conn, stored.lexicon_id, stored.id, &stored.strn, tag)?;
        }
        changed.push("tag");
    }

    if incoming.transcriptions != stored.transcriptions {
        conn.execute("DELETE FROM Transcription WHERE entryId = ?1;", [stored.id])?;
        insert_transcriptions(conn, stored.id, &incoming.transcriptions)?;
        changed.push("transcriptions");
    }

    if let Some(status) = &incoming.status {
        let same = matches!(&stored.status, Some(current) if current.same_state(status));
        if !same {
            append_status(conn, dialect, stored.id, status)?;
            changed.push("status");
        }
    }

    if diff_validations(conn, stored.id, &stored.validations, &incoming.validations)? {
        changed.push("validations");
    }

    if incoming.comments != stored.comments {
        conn.execute("DELETE FROM EntryComment WHERE entryId = ?1;", [stored.id])?;
        insert_comments(conn, stored.id, &incoming.comments)?;
        changed.push("comments");
    }

    if changed.is_empty() {
        return Ok((stored, false));
    }

    debug!(
        "event=entry_diff module=repo status=ok entry_id={} changed={}",
        stored.id,
        changed.join(",")
    );
    let reloaded =
        load_entry(conn, dialect, stored.id)?.ok_or(RepoError::EntryNotFound(stored.id))?;
    Ok((reloaded, true))
}

/// Applies the validation set difference: stored findings missing from
/// `incoming` are deleted by id, new findings are inserted. Unchanged rows
/// keep their ids and timestamps.
pub(crate) fn diff_validations(
    conn: &Connection,
    entry_id: EntryId,
    stored: &[EntryValidation],
    incoming: &[EntryValidation],
) -> RepoResult<bool> {
    let mut changed = false;
    for old in stored {
        if !incoming.iter().any(|new| new.same_finding(old)) {
            conn.execute("DELETE FROM EntryValidation WHERE id = ?1;", [old.id])?;
            changed = true;
        }
    }

    let added: Vec<EntryValidation> = incoming
        .iter()
        .filter(|new| !stored.iter().any(|old| old.same_finding(new)))
        .cloned()
        .collect();
    if !added.is_empty() {
        insert_validations(conn, entry_id, &added)?;
        changed = true;
    }
    Ok(changed)
}

/// Replaces every validation finding of an entry.
pub(crate) fn replace_validations(
    conn: &Connection,
    entry_id: EntryId,
    incoming: &[EntryValidation],
) -> RepoResult<()> {
    conn.execute("DELETE FROM EntryValidation WHERE entryId = ?1;", [entry_id])?;
    insert_validations(conn, entry_id, incoming)
}

/// Appends a current status row and demotes the previous current row.
pub(crate) fn append_status(
    conn: &Connection,
    dialect: &dyn Dialect,
    entry_id: EntryId,
    status: &EntryStatus,
) -> RepoResult<()> {
    if !dialect.enforces_single_current_status() {
        conn.execute(
            "UPDATE EntryStatus SET isCurrent = 0 WHERE entryId = ?1 AND isCurrent = 1;",
            [entry_id],
        )?;
    }

    let timestamp = if status.timestamp > 0 {
        status.timestamp
    } else {
        now_epoch_ms()
    };
    conn.execute(
        "INSERT INTO EntryStatus (entryId, name, source, timestamp, isCurrent)
         VALUES (?1, ?2, ?3, ?4, 1);",
        params![entry_id, status.name, status.source, timestamp],
    )?;
    Ok(())
}

fn insert_transcriptions(
    conn: &Connection,
    entry_id: EntryId,
    transcriptions: &[Transcription],
) -> RepoResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO Transcription (entryId, strn, language, sources) VALUES (?1, ?2, ?3, ?4);",
    )?;
    for transcription in transcriptions {
        stmt.execute(params![
            entry_id,
            transcription.strn,
            transcription.language,
            transcription.sources_column(),
        ])?;
    }
    Ok(())
}

fn insert_validations(
    conn: &Connection,
    entry_id: EntryId,
    validations: &[EntryValidation],
) -> RepoResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO EntryValidation (entryId, level, name, message, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    let now = now_epoch_ms();
    for validation in validations {
        let timestamp = if validation.timestamp > 0 {
            validation.timestamp
        } else {
            now
        };
        stmt.execute(params![
            entry_id,
            validation.level,
            validation.rule_name,
            validation.message,
            timestamp,
        ])?;
    }
    Ok(())
}

fn insert_comments(
    conn: &Connection,
    entry_id: EntryId,
    comments: &[EntryComment],
) -> RepoResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO EntryComment (entryId, label, source, comment) VALUES (?1, ?2, ?3, ?4);",
    )?;
    for comment in comments {
        stmt.execute(params![entry_id, comment.label, comment.source, comment.text])?;
    }
    Ok(())
}

/// An incoming lemma with an empty paradigm keeps the stored paradigm.
fn lemma_changed(stored: Option<&Lemma>, incoming: Option<&Lemma>) -> bool {
    match (stored, incoming) {
        (None, None) => false,
        (Some(old), Some(new)) => {
            old.strn != new.strn
                || old.reading != new.reading
                || (!new.paradigm.is_empty() && old.paradigm != new.paradigm)
        }
        _ => true,
    }
}

/// Resolves (or creates) the shared lemma row and links it to the entry.
fn link_lemma(conn: &Connection, entry_id: EntryId, lemma: &Lemma) -> RepoResult<()> {
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, paradigm FROM Lemma WHERE strn = ?1 AND reading = ?2;",
            params![lemma.strn, lemma.reading],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let lemma_id = match existing {
        Some((id, paradigm)) => {
            if !lemma.paradigm.is_empty() && paradigm != lemma.paradigm {
                conn.execute(
                    "UPDATE Lemma SET paradigm = ?1 WHERE id = ?2;",
                    params![lemma.paradigm, id],
                )?;
            }
            id
        }
        None => {
            conn.execute(
                "INSERT INTO Lemma (strn, reading, paradigm) VALUES (?1, ?2, ?3);",
                params![lemma.strn, lemma.reading, lemma.paradigm],
            )?;
            conn.last_insert_rowid()
        }
    };

    conn.execute("DELETE FROM Lemma2Entry WHERE entryId = ?1;", [entry_id])?;
    conn.execute(
        "INSERT INTO Lemma2Entry (lemmaId, entryId) VALUES (?1, ?2);",
        params![lemma_id, entry_id],
    )?;
    Ok(())
}

/// Binds `tag` to the entry unless a homograph in the lexicon already has it.
fn bind_tag(
    conn: &Connection,
    lexicon_id: LexiconId,
    entry_id: EntryId,
    word_form: &str,
    tag: &str,
) -> RepoResult<()> {
    let bound_to: Option<EntryId> = conn
        .query_row(
            "SELECT EntryTag.entryId
             FROM EntryTag
             INNER JOIN Entry ON Entry.id = EntryTag.entryId
             WHERE Entry.lexiconId = ?1
               AND EntryTag.wordForm = ?2
               AND EntryTag.tag = ?3;",
            params![lexicon_id, word_form, tag],
            |row| row.get(0),
        )
        .optional()?;

    match bound_to {
        Some(existing) if existing == entry_id => Ok(()),
        Some(existing) => Err(RepoError::DuplicateTag {
            tag: tag.to_string(),
            word_form: word_form.to_string(),
            lexicon_id,
            bound_to: existing,
        }),
        None => {
            conn.execute(
                "INSERT INTO EntryTag (entryId, tag, wordForm) VALUES (?1, ?2, ?3);",
                params![entry_id, tag, word_form],
            )?;
            Ok(())
        }
    }
}

fn set_preferred(
    conn: &Connection,
    dialect: &dyn Dialect,
    stored: &Entry,
    preferred: bool,
) -> RepoResult<()> {
    if preferred && !dialect.enforces_single_preferred() {
        clear_preferred(conn, stored.lexicon_id, &stored.strn, Some(stored.id))?;
    }
    conn.execute(
        "UPDATE Entry SET preferred = ?1 WHERE id = ?2;",
        params![bool_to_int(preferred), stored.id],
    )?;
    Ok(())
}

fn clear_preferred(
    conn: &Connection,
    lexicon_id: LexiconId,
    strn: &str,
    except: Option<EntryId>,
) -> RepoResult<()> {
    conn.execute(
        "UPDATE Entry
         SET preferred = 0
         WHERE lexiconId = ?1
           AND strn = ?2
           AND preferred = 1
           AND id <> ?3;",
        params![lexicon_id, strn, except.unwrap_or(0)],
    )?;
    Ok(())
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
