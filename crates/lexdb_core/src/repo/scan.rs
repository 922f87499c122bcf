//! Row aggregation: flat join rows back into entry aggregates.
//!
//! # Responsibility
//! - Fold the fanned-out join (transcriptions x validations x comments) into
//!   one [`Entry`] per entry id, in first-seen order.
//! - Deliver entries through the narrow [`EntrySink`] contract.
//!
//! # Invariants
//! - Rows of one entry are contiguous (the compiler orders by entry id).
//! - Entry-level columns, lemma and current status are taken from the first
//!   row of each entry; later rows never overwrite them.
//! - A child row is appended only the first time its id is seen for the
//!   current entry. Null child columns leave the collection untouched.

use super::error::{RepoError, RepoResult};
use crate::model::entry::{
    Entry, EntryComment, EntryId, EntryStatus, EntryValidation, Lemma, Transcription,
};
use crate::query::CompiledQuery;
use rusqlite::{params_from_iter, Connection, Row};
use std::collections::{BTreeMap, HashSet};

/// Receives entries one at a time as the aggregator completes them.
pub trait EntrySink {
    fn accept(&mut self, entry: Entry) -> RepoResult<()>;
}

impl EntrySink for Vec<Entry> {
    fn accept(&mut self, entry: Entry) -> RepoResult<()> {
        self.push(entry);
        Ok(())
    }
}

/// Groups entries by orthography.
impl EntrySink for BTreeMap<String, Vec<Entry>> {
    fn accept(&mut self, entry: Entry) -> RepoResult<()> {
        self.entry(entry.strn.clone()).or_default().push(entry);
        Ok(())
    }
}

/// Holds at most one entry; a second one is an error.
#[derive(Debug, Default)]
pub struct SingleEntry(pub Option<Entry>);

impl EntrySink for SingleEntry {
    fn accept(&mut self, entry: Entry) -> RepoResult<()> {
        if let Some(existing) = &self.0 {
            return Err(RepoError::InvalidData(format!(
                "expected a single entry, got {} and {}",
                existing.id, entry.id
            )));
        }
        self.0 = Some(entry);
        Ok(())
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EntrySink for FnSink<F>
where
    F: FnMut(Entry) -> RepoResult<()>,
{
    fn accept(&mut self, entry: Entry) -> RepoResult<()> {
        (self.0)(entry)
    }
}

/// One row of the compiled entry join, with nullable columns made explicit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinedRow {
    pub lexicon_id: i64,
    pub entry_id: EntryId,
    pub strn: String,
    pub language: String,
    pub part_of_speech: String,
    pub morphology: String,
    pub word_parts: String,
    pub preferred: bool,
    pub tag: Option<String>,
    pub transcription: Transcription,
    pub lemma: Option<Lemma>,
    pub status: Option<EntryStatus>,
    pub validation: Option<EntryValidation>,
    pub comment: Option<EntryComment>,
}

impl JoinedRow {
    pub(crate) fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let entry_id: EntryId = row.get("entry_id")?;

        let lemma = match row.get::<_, Option<i64>>("lemma_id")? {
            Some(id) => Some(Lemma {
                id,
                strn: row.get("lemma_strn")?,
                reading: row.get("lemma_reading")?,
                paradigm: row.get("lemma_paradigm")?,
            }),
            None => None,
        };

        let status = match row.get::<_, Option<i64>>("status_id")? {
            Some(id) => Some(EntryStatus {
                id,
                name: row.get("status_name")?,
                source: row.get("status_source")?,
                timestamp: row.get("status_timestamp")?,
                current: int_to_bool(row.get("status_current")?, "EntryStatus.isCurrent")?,
            }),
            None => None,
        };

        let validation = match row.get::<_, Option<i64>>("validation_id")? {
            Some(id) => Some(EntryValidation {
                id,
                level: row.get("validation_level")?,
                rule_name: row.get("validation_rule")?,
                message: row.get("validation_message")?,
                timestamp: row.get("validation_timestamp")?,
            }),
            None => None,
        };

        let comment = match row.get::<_, Option<i64>>("comment_id")? {
            Some(id) => Some(EntryComment {
                id,
                label: row.get("comment_label")?,
                source: row.get("comment_source")?,
                text: row.get("comment_text")?,
            }),
            None => None,
        };

        let sources: String = row.get("transcription_sources")?;
        Ok(Self {
            lexicon_id: row.get("lexicon_id")?,
            entry_id,
            strn: row.get("entry_strn")?,
            language: row.get("entry_language")?,
            part_of_speech: row.get("part_of_speech")?,
            morphology: row.get("morphology")?,
            word_parts: row.get("word_parts")?,
            preferred: int_to_bool(row.get("preferred")?, "Entry.preferred")?,
            tag: row.get("tag")?,
            transcription: Transcription {
                id: row.get("transcription_id")?,
                entry_id,
                strn: row.get("transcription_strn")?,
                language: row.get("transcription_language")?,
                sources: Transcription::parse_sources(&sources),
            },
            lemma,
            status,
            validation,
            comment,
        })
    }
}

/// Incremental fold of [`JoinedRow`]s into entries.
#[derive(Debug, Default)]
pub struct EntryAggregator {
    current: Option<Entry>,
    seen_transcriptions: HashSet<i64>,
    seen_validations: HashSet<i64>,
    seen_comments: HashSet<i64>,
}

impl EntryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one row. Returns the previous entry when `row` starts a new one.
    pub fn push(&mut self, row: JoinedRow) -> Option<Entry> {
        let same_entry = matches!(&self.current, Some(entry) if entry.id == row.entry_id);
        let flushed = if same_entry {
            None
        } else {
            self.start(&row)
        };

        let Some(entry) = self.current.as_mut() else {
            return flushed;
        };

        if self.seen_transcriptions.insert(row.transcription.id) {
            entry.transcriptions.push(row.transcription);
        }
        if let Some(validation) = row.validation {
            if self.seen_validations.insert(validation.id) {
                entry.validations.push(validation);
            }
        }
        if let Some(comment) = row.comment {
            if self.seen_comments.insert(comment.id) {
                entry.comments.push(comment);
            }
        }

        flushed
    }

    /// Completes and returns the last entry, if any.
    pub fn finish(self) -> Option<Entry> {
        self.current
    }

    fn start(&mut self, row: &JoinedRow) -> Option<Entry> {
        self.seen_transcriptions.clear();
        self.seen_validations.clear();
        self.seen_comments.clear();

        let next = Entry {
            id: row.entry_id,
            lexicon_id: row.lexicon_id,
            strn: row.strn.clone(),
            language: row.language.clone(),
            part_of_speech: row.part_of_speech.clone(),
            morphology: row.morphology.clone(),
            word_parts: row.word_parts.clone(),
            preferred: row.preferred,
            tag: row.tag.clone(),
            transcriptions: Vec::new(),
            lemma: row.lemma.clone(),
            status: row.status.clone(),
            validations: Vec::new(),
            comments: Vec::new(),
        };
        self.current.replace(next)
    }
}

/// Executes a compiled entry query and streams the folded entries to `sink`.
/// Returns the number of entries delivered.
pub(crate) fn scan_entries(
    conn: &Connection,
    compiled: &CompiledQuery,
    sink: &mut dyn EntrySink,
) -> RepoResult<usize> {
    let mut stmt = conn.prepare(&compiled.sql)?;
    let mut rows = stmt.query(params_from_iter(compiled.params.iter()))?;
    let mut aggregator = EntryAggregator::new();
    let mut delivered = 0;

    while let Some(row) = rows.next()? {
        if let Some(entry) = aggregator.push(JoinedRow::from_row(row)?) {
            sink.accept(entry)?;
            delivered += 1;
        }
    }
    if let Some(entry) = aggregator.finish() {
        sink.accept(entry)?;
        delivered += 1;
    }

    Ok(delivered)
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryAggregator, EntrySink, JoinedRow, SingleEntry};
    use crate::model::entry::{
        Entry, EntryComment, EntryStatus, EntryValidation, Lemma, Transcription,
    };
    use std::collections::BTreeMap;

    fn row(entry_id: i64, transcription_id: i64) -> JoinedRow {
        JoinedRow {
            lexicon_id: 1,
            entry_id,
            strn: format!("word{entry_id}"),
            language: "sv".to_string(),
            transcription: Transcription {
                id: transcription_id,
                entry_id,
                strn: format!("t{transcription_id}"),
                language: "sv".to_string(),
                sources: Vec::new(),
            },
            ..JoinedRow::default()
        }
    }

    fn comment(id: i64) -> Option<EntryComment> {
        Some(EntryComment {
            id,
            label: "label".to_string(),
            source: "src".to_string(),
            text: format!("comment {id}"),
        })
    }

    fn fold(rows: Vec<JoinedRow>) -> Vec<Entry> {
        let mut aggregator = EntryAggregator::new();
        let mut out = Vec::new();
        for row in rows {
            if let Some(entry) = aggregator.push(row) {
                out.push(entry);
            }
        }
        out.extend(aggregator.finish());
        out
    }

    #[test]
    fn cartesian_fan_out_is_deduplicated() {
        let mut rows = Vec::new();
        for transcription_id in [10, 11] {
            for comment_id in [1, 2, 3] {
                let mut r = row(7, transcription_id);
                r.comment = comment(comment_id);
                rows.push(r);
            }
        }

        let entries = fold(rows);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transcriptions.len(), 2);
        assert_eq!(entries[0].comments.len(), 3);
        let comment_ids: Vec<i64> = entries[0].comments.iter().map(|c| c.id).collect();
        assert_eq!(comment_ids, vec![1, 2, 3]);
    }

    #[test]
    fn entries_are_emitted_in_first_seen_order() {
        let entries = fold(vec![row(3, 30), row(3, 31), row(1, 10), row(9, 90)]);
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1, 9]);
        assert_eq!(entries[0].transcriptions.len(), 2);
    }

    #[test]
    fn first_row_wins_for_entry_level_lemma_and_status() {
        let mut first = row(5, 50);
        first.lemma = Some(Lemma {
            id: 1,
            strn: "first".to_string(),
            reading: String::new(),
            paradigm: String::new(),
        });
        first.status = Some(EntryStatus {
            id: 100,
            name: "ok".to_string(),
            source: "a".to_string(),
            timestamp: 1,
            current: true,
        });
        let mut second = row(5, 51);
        second.part_of_speech = "changed".to_string();
        second.lemma = Some(Lemma {
            id: 2,
            strn: "second".to_string(),
            reading: String::new(),
            paradigm: String::new(),
        });
        second.status = None;

        let entries = fold(vec![first, second]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].part_of_speech, "");
        assert_eq!(entries[0].lemma.as_ref().map(|l| l.id), Some(1));
        assert_eq!(entries[0].status.as_ref().map(|s| s.id), Some(100));
    }

    #[test]
    fn null_children_leave_collections_empty() {
        let entries = fold(vec![row(2, 20)]);
        assert!(entries[0].lemma.is_none());
        assert!(entries[0].status.is_none());
        assert!(entries[0].validations.is_empty());
        assert!(entries[0].comments.is_empty());
        assert!(entries[0].tag.is_none());
    }

    #[test]
    fn validations_repeat_per_transcription_but_are_kept_once() {
        let mut rows = Vec::new();
        for transcription_id in [1, 2] {
            for validation_id in [5, 6] {
                let mut r = row(4, transcription_id);
                r.validation = Some(EntryValidation {
                    id: validation_id,
                    level: "Fatal".to_string(),
                    rule_name: "rule".to_string(),
                    message: "msg".to_string(),
                    timestamp: 0,
                });
                rows.push(r);
            }
        }
        let entries = fold(rows);
        assert_eq!(entries[0].validations.len(), 2);
    }

    #[test]
    fn seen_sets_reset_between_entries() {
        let mut a = row(1, 10);
        a.comment = comment(1);
        let mut b = row(2, 10);
        b.comment = comment(1);
        let entries = fold(vec![a, b]);
        assert_eq!(entries[1].transcriptions.len(), 1);
        assert_eq!(entries[1].comments.len(), 1);
    }

    #[test]
    fn sinks_share_one_contract() {
        let mut by_word: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
        by_word.accept(Entry::new("a", "sv", "a")).unwrap();
        by_word.accept(Entry::new("a", "sv", "a2")).unwrap();
        assert_eq!(by_word["a"].len(), 2);

        let mut single = SingleEntry::default();
        single.accept(Entry::new("a", "sv", "a")).unwrap();
        assert!(single.accept(Entry::new("b", "sv", "b")).is_err());
    }
}
