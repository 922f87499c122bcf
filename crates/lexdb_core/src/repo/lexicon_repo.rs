//! Lexicon administration and per-lexicon aggregates.
//!
//! # Responsibility
//! - Create, rename, list and delete lexicons inside one database.
//! - Move entries between lexicons of the same database.
//! - Compute counts that need no validator (entries, statuses, stored
//!   validation findings).
//!
//! # Invariants
//! - Lexicon names are unique per database, non-blank and free of `:`.
//! - A lexicon that owns entries is never deleted.
//! - `move_new_entries` stamps exactly the entries it re-points, or
//!   changes nothing.

use super::error::{RepoError, RepoResult};
use super::tx::{read_transaction, write_transaction};
use crate::db::{now_epoch_ms, Dialect, DEFAULT_DIALECT};
use crate::model::entry::EntryStatus;
use crate::model::lexicon::{Lexicon, LexiconId, NewLexicon};
use crate::model::stats::ValidationStats;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::time::Instant;

const LEXICON_SELECT_SQL: &str = "SELECT id, name, symbolSetName, locale FROM Lexicon";

/// Entries of `from` whose orthography `to` lacks. Binds `?1 = from`,
/// `?2 = to`; `outer` names the candidate row.
fn new_entries_condition(outer: &str) -> String {
    format!(
        "{outer}.lexiconId = ?1
           AND NOT EXISTS (
               SELECT 1 FROM Entry AS existing
               WHERE existing.lexiconId = ?2
                 AND existing.strn = {outer}.strn
           )"
    )
}

/// Outcome of [`LexiconRepository::move_new_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub from: String,
    pub to: String,
    /// Entries re-pointed to `to` (equal to status rows stamped).
    pub moved: usize,
}

/// Repository interface for lexicon administration.
pub trait LexiconRepository {
    fn create_lexicon(&self, lexicon: &NewLexicon) -> RepoResult<Lexicon>;
    fn lexicon_by_name(&self, name: &str) -> RepoResult<Option<Lexicon>>;
    fn list_lexicons(&self) -> RepoResult<Vec<Lexicon>>;
    fn rename_lexicon(&self, from: &str, to: &str) -> RepoResult<Lexicon>;
    /// Fails with `LexiconNotEmpty` while the lexicon owns entries.
    fn delete_lexicon(&self, name: &str) -> RepoResult<()>;
    fn entry_count(&self, name: &str) -> RepoResult<i64>;
    /// Current status name to entry count.
    fn status_frequencies(&self, name: &str) -> RepoResult<BTreeMap<String, i64>>;
    /// Validation statistics computed from stored findings.
    fn persisted_validation_stats(&self, name: &str) -> RepoResult<ValidationStats>;
    /// Moves every entry of `from` whose orthography is absent in `to`,
    /// stamping `status` on each moved entry.
    fn move_new_entries(&self, from: &str, to: &str, status: &EntryStatus)
        -> RepoResult<MoveReport>;
}

/// SQLite-backed lexicon repository.
pub struct SqliteLexiconRepository<'conn> {
    conn: &'conn Connection,
    dialect: &'conn dyn Dialect,
}

impl<'conn> SqliteLexiconRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            dialect: &DEFAULT_DIALECT,
        }
    }

    pub fn with_dialect(conn: &'conn Connection, dialect: &'conn dyn Dialect) -> Self {
        Self { conn, dialect }
    }
}

impl LexiconRepository for SqliteLexiconRepository<'_> {
    fn create_lexicon(&self, lexicon: &NewLexicon) -> RepoResult<Lexicon> {
        check_lexicon_name(&lexicon.name)?;
        let created = write_transaction(
            self.conn,
            "create_lexicon",
            &format!("lexicon {}", lexicon.name),
            |tx| {
                if find_lexicon(tx, &lexicon.name)?.is_some() {
                    return Err(RepoError::DuplicateLexicon(lexicon.name.clone()));
                }
                tx.execute(
                    "INSERT INTO Lexicon (name, symbolSetName, locale) VALUES (?1, ?2, ?3);",
                    params![lexicon.name, lexicon.symbol_set_name, lexicon.locale],
                )?;
                Ok(Lexicon {
                    id: tx.last_insert_rowid(),
                    name: lexicon.name.clone(),
                    symbol_set_name: lexicon.symbol_set_name.clone(),
                    locale: lexicon.locale.clone(),
                })
            },
        )?;

        info!(
            "event=lexicon_create module=repo status=ok lexicon_id={} dialect={}",
            created.id,
            self.dialect.name()
        );
        Ok(created)
    }

    fn lexicon_by_name(&self, name: &str) -> RepoResult<Option<Lexicon>> {
        find_lexicon(self.conn, name)
    }

    fn list_lexicons(&self) -> RepoResult<Vec<Lexicon>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LEXICON_SELECT_SQL} ORDER BY name;"))?;
        let lexicons = stmt
            .query_map([], map_lexicon_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lexicons)
    }

    fn rename_lexicon(&self, from: &str, to: &str) -> RepoResult<Lexicon> {
        check_lexicon_name(to)?;
        write_transaction(self.conn, "rename_lexicon", &format!("lexicon {from}"), |tx| {
            let mut lexicon = lexicon_by_name_tx(tx, from)?;
            if from == to {
                return Ok(lexicon);
            }
            if find_lexicon(tx, to)?.is_some() {
                return Err(RepoError::DuplicateLexicon(to.to_string()));
            }
            tx.execute(
                "UPDATE Lexicon SET name = ?1 WHERE id = ?2;",
                params![to, lexicon.id],
            )?;
            lexicon.name = to.to_string();
            Ok(lexicon)
        })
    }

    fn delete_lexicon(&self, name: &str) -> RepoResult<()> {
        let lexicon_id =
            write_transaction(self.conn, "delete_lexicon", &format!("lexicon {name}"), |tx| {
                let lexicon = lexicon_by_name_tx(tx, name)?;
                let entries = count_entries(tx, lexicon.id)?;
                if entries > 0 {
                    return Err(RepoError::LexiconNotEmpty {
                        name: name.to_string(),
                        entries,
                    });
                }
                tx.execute("DELETE FROM Lexicon WHERE id = ?1;", [lexicon.id])?;
                Ok(lexicon.id)
            })?;

        info!(
            "event=lexicon_delete module=repo status=ok lexicon_id={}",
            lexicon_id
        );
        Ok(())
    }

    fn entry_count(&self, name: &str) -> RepoResult<i64> {
        read_transaction(self.conn, "entry_count", &format!("lexicon {name}"), |tx| {
            let lexicon = lexicon_by_name_tx(tx, name)?;
            count_entries(tx, lexicon.id)
        })
    }

    fn status_frequencies(&self, name: &str) -> RepoResult<BTreeMap<String, i64>> {
        read_transaction(
            self.conn,
            "status_frequencies",
            &format!("lexicon {name}"),
            |tx| {
                let lexicon = lexicon_by_name_tx(tx, name)?;
                let mut stmt = tx.prepare(
                    "SELECT EntryStatus.name, COUNT(*)
                     FROM EntryStatus
                     INNER JOIN Entry ON Entry.id = EntryStatus.entryId
                     WHERE Entry.lexiconId = ?1
                       AND EntryStatus.isCurrent = 1
                     GROUP BY EntryStatus.name
                     ORDER BY EntryStatus.name;",
                )?;
                let frequencies = stmt
                    .query_map([lexicon.id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(frequencies)
            },
        )
    }

    fn persisted_validation_stats(&self, name: &str) -> RepoResult<ValidationStats> {
        read_transaction(
            self.conn,
            "persisted_validation_stats",
            &format!("lexicon {name}"),
            |tx| {
                let lexicon = lexicon_by_name_tx(tx, name)?;
                let mut stats = ValidationStats {
                    validated_entries: count_entries(tx, lexicon.id)?,
                    entries_with_findings: tx.query_row(
                        "SELECT COUNT(DISTINCT EntryValidation.entryId)
                         FROM EntryValidation
                         INNER JOIN Entry ON Entry.id = EntryValidation.entryId
                         WHERE Entry.lexiconId = ?1;",
                        [lexicon.id],
                        |row| row.get(0),
                    )?,
                    ..ValidationStats::default()
                };

                let mut stmt = tx.prepare(
                    "SELECT EntryValidation.name, EntryValidation.level, COUNT(*)
                     FROM EntryValidation
                     INNER JOIN Entry ON Entry.id = EntryValidation.entryId
                     WHERE Entry.lexiconId = ?1
                     GROUP BY EntryValidation.name, EntryValidation.level;",
                )?;
                let groups = stmt
                    .query_map([lexicon.id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                for (rule_name, level, count) in groups {
                    stats.add_findings(&rule_name, &level, count);
                }
                Ok(stats)
            },
        )
    }

    fn move_new_entries(
        &self,
        from: &str,
        to: &str,
        status: &EntryStatus,
    ) -> RepoResult<MoveReport> {
        let started_at = Instant::now();
        let target = format!("lexicons {from} -> {to}");
        let result = write_transaction(self.conn, "move_new_entries", &target, |tx| {
            let source = lexicon_by_name_tx(tx, from)?;
            let destination = lexicon_by_name_tx(tx, to)?;
            if status.name.trim().is_empty() {
                return Err(RepoError::InvalidData(
                    "move status name cannot be empty".to_string(),
                ));
            }

            if !self.dialect.enforces_single_current_status() {
                tx.execute(
                    &format!(
                        "UPDATE EntryStatus
                         SET isCurrent = 0
                         WHERE isCurrent = 1
                           AND entryId IN (
                               SELECT candidate.id FROM Entry AS candidate
                               WHERE {}
                           );",
                        new_entries_condition("candidate")
                    ),
                    params![source.id, destination.id],
                )?;
            }

            let timestamp = if status.timestamp > 0 {
                status.timestamp
            } else {
                now_epoch_ms()
            };
            let stamped = tx.execute(
                &format!(
                    "INSERT INTO EntryStatus (entryId, name, source, timestamp, isCurrent)
                     SELECT candidate.id, ?3, ?4, ?5, 1
                     FROM Entry AS candidate
                     WHERE {};",
                    new_entries_condition("candidate")
                ),
                params![source.id, destination.id, status.name, status.source, timestamp],
            )?;

            let moved = tx.execute(
                &format!(
                    "UPDATE Entry SET lexiconId = ?2 WHERE {};",
                    new_entries_condition("Entry")
                ),
                params![source.id, destination.id],
            )?;

            if stamped != moved {
                return Err(RepoError::MoveMismatch {
                    from: from.to_string(),
                    to: to.to_string(),
                    stamped,
                    moved,
                });
            }
            Ok(MoveReport {
                from: from.to_string(),
                to: to.to_string(),
                moved,
            })
        });

        match &result {
            Ok(report) => info!(
                "event=entries_move module=repo status=ok moved={} duration_ms={}",
                report.moved,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=entries_move module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

/// Resolves a lexicon by name or fails with `LexiconNotFound`.
pub(crate) fn lexicon_by_name_tx(conn: &Connection, name: &str) -> RepoResult<Lexicon> {
    find_lexicon(conn, name)?.ok_or_else(|| RepoError::LexiconNotFound(name.to_string()))
}

/// Fails with `LexiconNotFound` for the first unknown name.
pub(crate) fn ensure_lexicons_exist(conn: &Connection, names: &[String]) -> RepoResult<()> {
    for name in names {
        lexicon_by_name_tx(conn, name)?;
    }
    Ok(())
}

fn find_lexicon(conn: &Connection, name: &str) -> RepoResult<Option<Lexicon>> {
    let lexicon = conn
        .query_row(
            &format!("{LEXICON_SELECT_SQL} WHERE name = ?1;"),
            [name],
            map_lexicon_row,
        )
        .optional()?;
    Ok(lexicon)
}

fn count_entries(conn: &Connection, lexicon_id: LexiconId) -> RepoResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM Entry WHERE lexiconId = ?1;",
        [lexicon_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn check_lexicon_name(name: &str) -> RepoResult<()> {
    if name.trim().is_empty() || name.contains(':') {
        return Err(RepoError::InvalidLexiconName(name.to_string()));
    }
    Ok(())
}

fn map_lexicon_row(row: &Row<'_>) -> rusqlite::Result<Lexicon> {
    Ok(Lexicon {
        id: row.get(0)?,
        name: row.get(1)?,
        symbol_set_name: row.get(2)?,
        locale: row.get(3)?,
    })
}
