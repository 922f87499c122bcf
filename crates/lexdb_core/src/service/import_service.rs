//! Batched import of already-parsed entries.
//!
//! # Responsibility
//! - Buffer incoming records and flush them in fixed-size batches, one
//!   transaction per batch.
//! - Report progress through a caller-supplied [`LogSink`].
//!
//! # Invariants
//! - A failing batch leaves none of its entries behind. Batches flushed
//!   before the failure stay committed and are counted in the error.

use crate::logging::LogSink;
use crate::model::entry::{Entry, EntryStatus};
use crate::repo::{EntryRepository, RepoError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub const DEFAULT_IMPORT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Entries per insert transaction.
    pub batch_size: usize,
    /// Status stamped on every imported entry that carries none.
    pub initial_status: Option<EntryStatus>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_IMPORT_BATCH_SIZE,
            initial_status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub batches: usize,
}

#[derive(Debug)]
pub enum ImportError {
    /// The record source yielded an error at `record` (1-based).
    Source {
        record: usize,
        message: String,
        committed: usize,
    },
    /// A batch failed to insert; `committed` entries were stored before it.
    Repo { source: RepoError, committed: usize },
}

impl ImportError {
    /// Entries committed before the failure.
    pub fn committed(&self) -> usize {
        match self {
            Self::Source { committed, .. } | Self::Repo { committed, .. } => *committed,
        }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source {
                record,
                message,
                committed,
            } => write!(
                f,
                "record {record}: {message} ({committed} entries committed before the failure)"
            ),
            Self::Repo { source, committed } => write!(
                f,
                "{source} ({committed} entries committed before the failure)"
            ),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo { source, .. } => Some(source),
            Self::Source { .. } => None,
        }
    }
}

pub struct ImportService<R: EntryRepository> {
    repo: R,
}

impl<R: EntryRepository> ImportService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Imports `records` into `lexicon` in batches of `options.batch_size`.
    pub fn import<I, E>(
        &self,
        lexicon: &str,
        records: I,
        options: &ImportOptions,
        progress: &dyn LogSink,
    ) -> Result<ImportReport, ImportError>
    where
        I: IntoIterator<Item = Result<Entry, E>>,
        E: Display,
    {
        let started_at = Instant::now();
        let batch_size = options.batch_size.max(1);
        let mut report = ImportReport::default();
        let mut batch = Vec::with_capacity(batch_size.min(DEFAULT_IMPORT_BATCH_SIZE));

        for (index, record) in records.into_iter().enumerate() {
            let mut entry = record.map_err(|err| ImportError::Source {
                record: index + 1,
                message: err.to_string(),
                committed: report.imported,
            })?;
            if entry.status.is_none() {
                entry.status = options.initial_status.clone();
            }
            batch.push(entry);

            if batch.len() >= batch_size {
                self.flush(lexicon, &mut batch, &mut report, progress)?;
            }
        }
        if !batch.is_empty() {
            self.flush(lexicon, &mut batch, &mut report, progress)?;
        }

        info!(
            "event=import module=service status=ok lexicon={} imported={} batches={} duration_ms={}",
            lexicon,
            report.imported,
            report.batches,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn flush(
        &self,
        lexicon: &str,
        batch: &mut Vec<Entry>,
        report: &mut ImportReport,
        progress: &dyn LogSink,
    ) -> Result<(), ImportError> {
        match self.repo.insert_entries(lexicon, batch) {
            Ok(ids) => {
                report.imported += ids.len();
                report.batches += 1;
                batch.clear();
                progress.write(&format!(
                    "imported {} entries into {lexicon}",
                    report.imported
                ));
                Ok(())
            }
            Err(source) => {
                error!(
                    "event=import module=service status=error lexicon={} committed={} error={}",
                    lexicon, report.imported, source
                );
                Err(ImportError::Repo {
                    source,
                    committed: report.imported,
                })
            }
        }
    }
}
