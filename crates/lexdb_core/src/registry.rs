//! Multi-database lexicon registry.
//!
//! # Responsibility
//! - Hold named database handles behind a reader/writer lock.
//! - Fan listing and search out to every relevant database concurrently,
//!   one worker thread per database.
//! - Route `database:lexicon` references to the right handle.
//!
//! # Invariants
//! - The registry lock guards only the map. Workers receive cloned handles
//!   and run without it.
//! - A fan-out call returns every database's result or an error; never a
//!   partial result set.
//! - A fan-out call waits at most `RegistryOptions::listing_timeout` and
//!   stops waiting as soon as its `ListCancellation` fires.

use crate::db::Database;
use crate::model::entry::{Entry, EntryStatus};
use crate::model::lexicon::{LexiconRef, NewLexicon, QualifiedLexicon};
use crate::query::Query;
use crate::repo::{
    EntryRepository, ErrorKind, LexiconRepository, MoveReport, RepoError, SqliteEntryRepository,
    SqliteLexiconRepository,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_LISTING_TIMEOUT: Duration = Duration::from_secs(30);
const CANCELLATION_POLL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub enum RegistryError {
    InvalidDatabaseName(String),
    DuplicateDatabase(String),
    DatabaseNotFound(String),
    /// `move_new_entries` needs both lexicons in one database.
    CrossDatabaseMove { from: LexiconRef, to: LexiconRef },
    /// A repository call failed in `database`.
    Repo { database: String, source: RepoError },
    /// Workers for `pending` had not answered when the deadline passed.
    Timeout { pending: Vec<String> },
    Cancelled,
    /// A worker thread died without reporting.
    WorkerLost(String),
    Spawn(std::io::Error),
    LockPoisoned,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseNotFound(_) => ErrorKind::NotFound,
            Self::InvalidDatabaseName(_)
            | Self::DuplicateDatabase(_)
            | Self::CrossDatabaseMove { .. } => ErrorKind::InvariantViolation,
            Self::Repo { source, .. } => source.kind(),
            Self::Timeout { .. }
            | Self::Cancelled
            | Self::WorkerLost(_)
            | Self::Spawn(_)
            | Self::LockPoisoned => ErrorKind::Backend,
        }
    }
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDatabaseName(name) => write!(f, "database name is invalid: `{name}`"),
            Self::DuplicateDatabase(name) => write!(f, "database already registered: {name}"),
            Self::DatabaseNotFound(name) => write!(f, "database not found: {name}"),
            Self::CrossDatabaseMove { from, to } => write!(
                f,
                "cannot move entries between databases ({from} -> {to})"
            ),
            Self::Repo { database, source } => write!(f, "database {database}: {source}"),
            Self::Timeout { pending } => write!(
                f,
                "timed out waiting for databases: {}",
                pending.join(",")
            ),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::WorkerLost(name) => write!(f, "worker for database {name} stopped unexpectedly"),
            Self::Spawn(err) => write!(f, "failed to start worker thread: {err}"),
            Self::LockPoisoned => write!(f, "registry lock poisoned"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo { source, .. } => Some(source),
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Upper bound for one fan-out call.
    pub listing_timeout: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            listing_timeout: DEFAULT_LISTING_TIMEOUT,
        }
    }
}

/// Caller-held cancellation flag for fan-out calls. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct ListCancellation(Arc<AtomicBool>);

impl ListCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An entry together with the database it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedEntry {
    pub database: String,
    pub entry: Entry,
}

#[derive(Debug, Default)]
pub struct LexiconRegistry {
    databases: RwLock<BTreeMap<String, Arc<Database>>>,
    options: RegistryOptions,
}

impl LexiconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            databases: RwLock::default(),
            options,
        }
    }

    /// Registers a handle under its own name.
    pub fn add_database(&self, database: Database) -> Result<Arc<Database>, RegistryError> {
        let name = database.name().to_string();
        if !is_valid_database_name(&name) {
            return Err(RegistryError::InvalidDatabaseName(name));
        }

        let mut databases = self
            .databases
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?;
        if databases.contains_key(&name) {
            return Err(RegistryError::DuplicateDatabase(name));
        }
        let database = Arc::new(database);
        databases.insert(name.clone(), Arc::clone(&database));
        drop(databases);

        info!(
            "event=registry_add module=registry status=ok database={} dialect={}",
            name,
            database.dialect().name()
        );
        Ok(database)
    }

    /// Unregisters a handle. Workers still holding it finish normally.
    pub fn remove_database(&self, name: &str) -> Result<Arc<Database>, RegistryError> {
        let removed = self
            .databases
            .write()
            .map_err(|_| RegistryError::LockPoisoned)?
            .remove(name)
            .ok_or_else(|| RegistryError::DatabaseNotFound(name.to_string()))?;

        info!(
            "event=registry_remove module=registry status=ok database={}",
            name
        );
        Ok(removed)
    }

    pub fn database(&self, name: &str) -> Result<Arc<Database>, RegistryError> {
        self.databases
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::DatabaseNotFound(name.to_string()))
    }

    /// Sorted database names.
    pub fn database_names(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .databases
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?
            .keys()
            .cloned()
            .collect())
    }

    pub fn define_lexicon(
        &self,
        database: &str,
        lexicon: &NewLexicon,
    ) -> Result<QualifiedLexicon, RegistryError> {
        let handle = self.database(database)?;
        let created = handle
            .with_connection(|conn, dialect| {
                SqliteLexiconRepository::with_dialect(conn, dialect).create_lexicon(lexicon)
            })
            .map_err(|source| repo_error(database, source))?;
        Ok(QualifiedLexicon {
            database: database.to_string(),
            lexicon: created,
        })
    }

    pub fn delete_lexicon(&self, reference: &LexiconRef) -> Result<(), RegistryError> {
        let handle = self.database(&reference.database)?;
        handle
            .with_connection(|conn, dialect| {
                SqliteLexiconRepository::with_dialect(conn, dialect)
                    .delete_lexicon(&reference.lexicon)
            })
            .map_err(|source| repo_error(&reference.database, source))
    }

    /// Lists the lexicons of every registered database, ordered by
    /// `database:lexicon`.
    pub fn list_lexicons(
        &self,
        cancel: &ListCancellation,
    ) -> Result<Vec<QualifiedLexicon>, RegistryError> {
        let started_at = Instant::now();
        let targets = self.snapshot()?;
        let results = self.fan_out("list_lexicons", targets, cancel, |database| {
            database.with_connection(|conn, dialect| {
                SqliteLexiconRepository::with_dialect(conn, dialect).list_lexicons()
            })
        })?;

        let lexicons: Vec<QualifiedLexicon> = results
            .into_iter()
            .flat_map(|(database, lexicons)| {
                lexicons.into_iter().map(move |lexicon| QualifiedLexicon {
                    database: database.clone(),
                    lexicon,
                })
            })
            .collect();

        info!(
            "event=registry_list module=registry status=ok lexicons={} duration_ms={}",
            lexicons.len(),
            started_at.elapsed().as_millis()
        );
        Ok(lexicons)
    }

    /// Runs `query` against lexicons spread over several databases. The
    /// query's own `lexicons` field is replaced per database by the names
    /// in `lexicons`.
    pub fn search(
        &self,
        lexicons: &[LexiconRef],
        query: &Query,
        cancel: &ListCancellation,
    ) -> Result<Vec<QualifiedEntry>, RegistryError> {
        let mut per_database: BTreeMap<String, Query> = BTreeMap::new();
        for reference in lexicons {
            per_database
                .entry(reference.database.clone())
                .or_insert_with(|| Query {
                    lexicons: Vec::new(),
                    ..query.clone()
                })
                .lexicons
                .push(reference.lexicon.clone());
        }

        let targets = per_database
            .keys()
            .map(|name| self.database(name))
            .collect::<Result<Vec<_>, _>>()?;
        let per_database = Arc::new(per_database);

        let results = self.fan_out("search", targets, cancel, move |database| {
            match per_database.get(database.name()) {
                Some(query) => database.with_connection(|conn, dialect| {
                    SqliteEntryRepository::with_dialect(conn, dialect).search(query)
                }),
                None => Ok(Vec::new()),
            }
        })?;

        Ok(results
            .into_iter()
            .flat_map(|(database, entries)| {
                entries.into_iter().map(move |entry| QualifiedEntry {
                    database: database.clone(),
                    entry,
                })
            })
            .collect())
    }

    /// Moves new entries between two lexicons of the same database.
    pub fn move_new_entries(
        &self,
        from: &LexiconRef,
        to: &LexiconRef,
        status: &EntryStatus,
    ) -> Result<MoveReport, RegistryError> {
        if from.database != to.database {
            return Err(RegistryError::CrossDatabaseMove {
                from: from.clone(),
                to: to.clone(),
            });
        }
        let handle = self.database(&from.database)?;
        handle
            .with_connection(|conn, dialect| {
                SqliteLexiconRepository::with_dialect(conn, dialect).move_new_entries(
                    &from.lexicon,
                    &to.lexicon,
                    status,
                )
            })
            .map_err(|source| repo_error(&from.database, source))
    }

    fn snapshot(&self) -> Result<Vec<Arc<Database>>, RegistryError> {
        Ok(self
            .databases
            .read()
            .map_err(|_| RegistryError::LockPoisoned)?
            .values()
            .cloned()
            .collect())
    }

    /// Runs `work` once per database on its own thread and gathers every
    /// result, sorted by database name.
    fn fan_out<T, F>(
        &self,
        operation: &'static str,
        targets: Vec<Arc<Database>>,
        cancel: &ListCancellation,
        work: F,
    ) -> Result<Vec<(String, T)>, RegistryError>
    where
        T: Send + 'static,
        F: Fn(&Database) -> Result<T, RepoError> + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(targets.len().max(1));
        let work = Arc::new(work);
        let mut pending = BTreeSet::new();

        for database in targets {
            let name = database.name().to_string();
            let sender = sender.clone();
            let work = Arc::clone(&work);
            thread::Builder::new()
                .name(format!("lexdb-{operation}-{name}"))
                .spawn(move || {
                    let result = (*work)(database.as_ref());
                    let _ = sender.send((database.name().to_string(), result));
                })
                .map_err(RegistryError::Spawn)?;
            pending.insert(name);
        }
        drop(sender);

        let deadline = Instant::now() + self.options.listing_timeout;
        let mut results = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            if cancel.is_cancelled() {
                return Err(fan_out_failed(operation, RegistryError::Cancelled));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(fan_out_failed(
                    operation,
                    RegistryError::Timeout {
                        pending: pending.into_iter().collect(),
                    },
                ));
            }

            match receiver.recv_timeout((deadline - now).min(CANCELLATION_POLL)) {
                Ok((name, Ok(value))) => {
                    pending.remove(&name);
                    results.push((name, value));
                }
                Ok((name, Err(source))) => {
                    return Err(fan_out_failed(operation, repo_error(&name, source)));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    let lost = pending.into_iter().next().unwrap_or_default();
                    return Err(fan_out_failed(operation, RegistryError::WorkerLost(lost)));
                }
            }
        }

        results.sort_by(|(left, _), (right, _)| left.cmp(right));
        Ok(results)
    }
}

fn repo_error(database: &str, source: RepoError) -> RegistryError {
    RegistryError::Repo {
        database: database.to_string(),
        source,
    }
}

fn fan_out_failed(operation: &str, err: RegistryError) -> RegistryError {
    error!(
        "event=registry_fan_out module=registry status=error operation={} error={}",
        operation, err
    );
    err
}

fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::{is_valid_database_name, ListCancellation};

    #[test]
    fn database_names_exclude_separator_and_spaces() {
        assert!(is_valid_database_name("nst_sv-2.0"));
        assert!(!is_valid_database_name(""));
        assert!(!is_valid_database_name("a:b"));
        assert!(!is_valid_database_name("a b"));
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let cancel = ListCancellation::new();
        let held_by_caller = cancel.clone();
        assert!(!cancel.is_cancelled());
        held_by_caller.cancel();
        assert!(cancel.is_cancelled());
    }
}
