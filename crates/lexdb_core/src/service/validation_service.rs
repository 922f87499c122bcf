//! Validator contract and re-validation of stored entries.
//!
//! # Responsibility
//! - Define the consumed validator dependency as a trait the caller passes
//!   per call.
//! - Re-run a validator over every entry matching a query and persist the
//!   findings, replaced or diffed.
//!
//! # Invariants
//! - The engine never inspects rule logic, only the returned findings.
//! - Each chunk of entries is persisted in its own transaction.

use crate::logging::LogSink;
use crate::model::entry::{Entry, EntryId, EntryValidation};
use crate::query::Query;
use crate::repo::{EntryRepository, RepoResult, ValidationMode};
use log::info;
use std::time::Instant;

/// Entries loaded and persisted per transaction during re-validation.
pub const DEFAULT_REVALIDATION_CHUNK: usize = 1_000;

/// Produces validation findings for one entry.
pub trait EntryValidator {
    fn validate(&self, entry: &Entry) -> Vec<EntryValidation>;

    /// Replaces `entry.validations` with fresh findings.
    fn validate_in_place(&self, entry: &mut Entry) {
        entry.validations = self.validate(entry);
    }
}

impl<F> EntryValidator for F
where
    F: Fn(&Entry) -> Vec<EntryValidation>,
{
    fn validate(&self, entry: &Entry) -> Vec<EntryValidation> {
        self(entry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevalidationOptions {
    pub mode: ValidationMode,
    pub chunk_size: usize,
}

impl Default for RevalidationOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Diff,
            chunk_size: DEFAULT_REVALIDATION_CHUNK,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationReport {
    /// Entries the validator ran on.
    pub validated: usize,
    /// Entries whose stored findings changed.
    pub changed: usize,
}

/// Re-validation use cases over an entry repository.
pub struct ValidationService<R: EntryRepository> {
    repo: R,
}

impl<R: EntryRepository> ValidationService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Validates without persisting.
    pub fn validate_entries(
        &self,
        query: &Query,
        validator: &dyn EntryValidator,
    ) -> RepoResult<Vec<Entry>> {
        let mut entries = self.repo.search(query)?;
        for entry in &mut entries {
            validator.validate_in_place(entry);
        }
        Ok(entries)
    }

    /// Re-runs `validator` over every entry matching `query` and stores the
    /// findings according to `options.mode`.
    pub fn revalidate(
        &self,
        query: &Query,
        validator: &dyn EntryValidator,
        options: &RevalidationOptions,
        progress: &dyn LogSink,
    ) -> RepoResult<RevalidationReport> {
        let started_at = Instant::now();
        let ids = self.repo.entry_ids(query)?;
        let mut report = RevalidationReport::default();

        for chunk in ids.chunks(options.chunk_size.max(1)) {
            let entries = self.repo.search(&Query::by_ids(chunk.iter().copied()))?;
            let findings: Vec<(EntryId, Vec<EntryValidation>)> = entries
                .iter()
                .map(|entry| (entry.id, validator.validate(entry)))
                .collect();
            report.validated += findings.len();
            report.changed += self.repo.store_validations(&findings, options.mode)?;
            progress.write(&format!(
                "revalidated {}/{} entries",
                report.validated,
                ids.len()
            ));
        }

        info!(
            "event=revalidate module=service status=ok validated={} changed={} duration_ms={}",
            report.validated,
            report.changed,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}
