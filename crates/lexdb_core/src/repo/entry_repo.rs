//! Entry repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the entry-level administrative operations: bulk insert,
//!   diff-based update, search/paginate, delete.
//! - Keep SQL and transaction handling inside the persistence boundary.
//!
//! # Invariants
//! - Every multi-step write runs in exactly one transaction.
//! - Searches name only existing lexicons; an unknown name is an error,
//!   never an empty result.
//! - Write paths call `Entry::validate()` before SQL mutations.

use super::error::{RepoError, RepoResult};
use super::lexicon_repo::{ensure_lexicons_exist, lexicon_by_name_tx};
use super::scan::{int_to_bool, scan_entries, EntrySink};
use super::tx::{read_transaction, write_transaction};
use super::writer;
use crate::db::{Dialect, DEFAULT_DIALECT};
use crate::model::entry::{Entry, EntryId, EntryStatus, EntryValidation};
use crate::query::{compile_count_query, compile_entry_query, compile_id_query, Query};
use log::info;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeMap;
use std::time::Instant;

/// How re-validation findings are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Delete every stored finding, insert the new ones.
    Replace,
    /// Insert new findings, delete vanished ones by id, keep the rest.
    #[default]
    Diff,
}

/// Result of a diff-based update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The entry as stored after the call.
    pub entry: Entry,
    /// Whether any row was written.
    pub updated: bool,
}

/// Repository interface for entry persistence and search.
pub trait EntryRepository {
    /// Inserts all entries into `lexicon` in one transaction.
    fn insert_entries(&self, lexicon: &str, entries: &[Entry]) -> RepoResult<Vec<EntryId>>;
    fn insert_entry(&self, lexicon: &str, entry: &Entry) -> RepoResult<EntryId>;
    fn update_entry(&self, entry: &Entry) -> RepoResult<UpdateOutcome>;
    fn get_entry(&self, id: EntryId) -> RepoResult<Option<Entry>>;
    fn search(&self, query: &Query) -> RepoResult<Vec<Entry>>;
    /// Streams matching entries into `sink`; returns how many were delivered.
    fn search_each(&self, query: &Query, sink: &mut dyn EntrySink) -> RepoResult<usize>;
    fn entries_by_word(&self, query: &Query) -> RepoResult<BTreeMap<String, Vec<Entry>>>;
    /// Number of matching entries, ignoring paging.
    fn count(&self, query: &Query) -> RepoResult<i64>;
    fn entry_ids(&self, query: &Query) -> RepoResult<Vec<EntryId>>;
    fn delete_entry(&self, id: EntryId) -> RepoResult<()>;
    /// Full status history, oldest first.
    fn status_history(&self, id: EntryId) -> RepoResult<Vec<EntryStatus>>;
    /// Persists validation findings for several entries in one transaction.
    /// Returns how many entries had their stored findings changed.
    fn store_validations(
        &self,
        findings: &[(EntryId, Vec<EntryValidation>)],
        mode: ValidationMode,
    ) -> RepoResult<usize>;
}

/// SQLite-backed entry repository.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
    dialect: &'conn dyn Dialect,
}

impl<'conn> SqliteEntryRepository<'conn> {
    /// Uses the default trigger-backed SQLite dialect.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            dialect: &DEFAULT_DIALECT,
        }
    }

    /// Uses the dialect the connection was opened with.
    pub fn with_dialect(conn: &'conn Connection, dialect: &'conn dyn Dialect) -> Self {
        Self { conn, dialect }
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn insert_entries(&self, lexicon: &str, entries: &[Entry]) -> RepoResult<Vec<EntryId>> {
        let started_at = Instant::now();
        let target = format!("lexicon {lexicon}");
        let ids = write_transaction(self.conn, "insert_entries", &target, |tx| {
            let lexicon_id = lexicon_by_name_tx(tx, lexicon)?.id;
            entries
                .iter()
                .map(|entry| writer::insert_entry(tx, self.dialect, lexicon_id, entry))
                .collect::<RepoResult<Vec<_>>>()
        })?;

        info!(
            "event=entries_insert module=repo status=ok lexicon={} count={} duration_ms={}",
            lexicon,
            ids.len(),
            started_at.elapsed().as_millis()
        );
        Ok(ids)
    }

    fn insert_entry(&self, lexicon: &str, entry: &Entry) -> RepoResult<EntryId> {
        let ids = self.insert_entries(lexicon, std::slice::from_ref(entry))?;
        ids.into_iter()
            .next()
            .ok_or_else(|| RepoError::InvalidData("insert returned no entry id".to_string()))
    }

    fn update_entry(&self, entry: &Entry) -> RepoResult<UpdateOutcome> {
        let target = format!("entry {}", entry.id);
        let (stored, updated) = write_transaction(self.conn, "update_entry", &target, |tx| {
            writer::update_entry(tx, self.dialect, entry)
        })?;
        Ok(UpdateOutcome {
            entry: stored,
            updated,
        })
    }

    fn get_entry(&self, id: EntryId) -> RepoResult<Option<Entry>> {
        read_transaction(self.conn, "get_entry", &format!("entry {id}"), |tx| {
            writer::load_entry(tx, self.dialect, id)
        })
    }

    fn search(&self, query: &Query) -> RepoResult<Vec<Entry>> {
        let mut entries = Vec::new();
        self.search_each(query, &mut entries)?;
        Ok(entries)
    }

    fn search_each(&self, query: &Query, sink: &mut dyn EntrySink) -> RepoResult<usize> {
        let compiled = compile_entry_query(query, self.dialect)?;
        read_transaction(self.conn, "search", &search_target(query), |tx| {
            ensure_lexicons_exist(tx, &query.lexicons)?;
            scan_entries(tx, &compiled, sink)
        })
    }

    fn entries_by_word(&self, query: &Query) -> RepoResult<BTreeMap<String, Vec<Entry>>> {
        let mut by_word = BTreeMap::new();
        self.search_each(query, &mut by_word)?;
        Ok(by_word)
    }

    fn count(&self, query: &Query) -> RepoResult<i64> {
        let compiled = compile_count_query(query, self.dialect)?;
        read_transaction(self.conn, "count", &search_target(query), |tx| {
            ensure_lexicons_exist(tx, &query.lexicons)?;
            let count = tx.query_row(
                &compiled.sql,
                params_from_iter(compiled.params.iter()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    fn entry_ids(&self, query: &Query) -> RepoResult<Vec<EntryId>> {
        let compiled = compile_id_query(query, self.dialect)?;
        read_transaction(self.conn, "entry_ids", &search_target(query), |tx| {
            ensure_lexicons_exist(tx, &query.lexicons)?;
            let mut stmt = tx.prepare(&compiled.sql)?;
            let ids = stmt
                .query_map(params_from_iter(compiled.params.iter()), |row| row.get(0))?
                .collect::<Result<Vec<EntryId>, _>>()?;
            Ok(ids)
        })
    }

    fn delete_entry(&self, id: EntryId) -> RepoResult<()> {
        write_transaction(self.conn, "delete_entry", &format!("entry {id}"), |tx| {
            let changed = tx.execute("DELETE FROM Entry WHERE id = ?1;", [id])?;
            if changed == 0 {
                return Err(RepoError::EntryNotFound(id));
            }
            Ok(())
        })?;

        info!("event=entry_delete module=repo status=ok entry_id={}", id);
        Ok(())
    }

    fn status_history(&self, id: EntryId) -> RepoResult<Vec<EntryStatus>> {
        read_transaction(self.conn, "status_history", &format!("entry {id}"), |tx| {
            ensure_entry_exists(tx, id)?;
            let mut stmt = tx.prepare(
                "SELECT id, name, source, timestamp, isCurrent
                 FROM EntryStatus
                 WHERE entryId = ?1
                 ORDER BY id;",
            )?;
            let rows = stmt
                .query_map([id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, name, source, timestamp, current)| {
                    Ok(EntryStatus {
                        id,
                        name,
                        source,
                        timestamp,
                        current: int_to_bool(current, "EntryStatus.isCurrent")?,
                    })
                })
                .collect()
        })
    }

    fn store_validations(
        &self,
        findings: &[(EntryId, Vec<EntryValidation>)],
        mode: ValidationMode,
    ) -> RepoResult<usize> {
        let target = format!("{} entries", findings.len());
        write_transaction(self.conn, "store_validations", &target, |tx| {
            let mut changed = 0;
            for (entry_id, incoming) in findings {
                ensure_entry_exists(tx, *entry_id)?;
                let stored = load_validations(tx, *entry_id)?;
                let entry_changed = match mode {
                    ValidationMode::Replace => {
                        writer::replace_validations(tx, *entry_id, incoming)?;
                        true
                    }
                    ValidationMode::Diff => {
                        writer::diff_validations(tx, *entry_id, &stored, incoming)?
                    }
                };
                if entry_changed {
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}

fn ensure_entry_exists(conn: &Connection, id: EntryId) -> RepoResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM Entry WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(RepoError::EntryNotFound(id))
    }
}

fn load_validations(conn: &Connection, entry_id: EntryId) -> RepoResult<Vec<EntryValidation>> {
    let mut stmt = conn.prepare(
        "SELECT id, level, name, message, timestamp
         FROM EntryValidation
         WHERE entryId = ?1
         ORDER BY id;",
    )?;
    let validations = stmt
        .query_map([entry_id], |row| {
            Ok(EntryValidation {
                id: row.get(0)?,
                level: row.get(1)?,
                rule_name: row.get(2)?,
                message: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(validations)
}

fn search_target(query: &Query) -> String {
    if query.lexicons.is_empty() {
        format!("{} entry ids", query.entry_ids.len())
    } else {
        format!("lexicons {}", query.lexicons.join(","))
    }
}
