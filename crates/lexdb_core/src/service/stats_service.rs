//! Per-lexicon statistics.
//!
//! Entry counts and status histograms come from SQL aggregates. Validation
//! statistics either come from a validator run over every entry, or from
//! the findings already stored.

use super::validation_service::EntryValidator;
use crate::model::entry::Entry;
use crate::model::stats::{LexiconStats, ValidationStats};
use crate::query::Query;
use crate::repo::{EntryRepository, FnSink, LexiconRepository, RepoResult};

pub struct StatsService<E: EntryRepository, L: LexiconRepository> {
    entries: E,
    lexicons: L,
}

impl<E: EntryRepository, L: LexiconRepository> StatsService<E, L> {
    pub fn new(entries: E, lexicons: L) -> Self {
        Self { entries, lexicons }
    }

    /// Counts entries and current statuses; with a validator, also runs it
    /// over every entry of the lexicon without persisting findings.
    pub fn lexicon_stats(
        &self,
        lexicon: &str,
        validator: Option<&dyn EntryValidator>,
    ) -> RepoResult<LexiconStats> {
        let mut stats = LexiconStats {
            lexicon: lexicon.to_string(),
            entries: self.lexicons.entry_count(lexicon)?,
            statuses: self.lexicons.status_frequencies(lexicon)?,
            validation: None,
        };

        if let Some(validator) = validator {
            let mut validation = ValidationStats::default();
            let mut sink = FnSink(|entry: Entry| -> RepoResult<()> {
                validation.record(&validator.validate(&entry));
                Ok(())
            });
            self.entries
                .search_each(&Query::all_in([lexicon]), &mut sink)?;
            stats.validation = Some(validation);
        }
        Ok(stats)
    }

    /// Same counts, with validation statistics read from stored findings.
    pub fn persisted_stats(&self, lexicon: &str) -> RepoResult<LexiconStats> {
        Ok(LexiconStats {
            lexicon: lexicon.to_string(),
            entries: self.lexicons.entry_count(lexicon)?,
            statuses: self.lexicons.status_frequencies(lexicon)?,
            validation: Some(self.lexicons.persisted_validation_stats(lexicon)?),
        })
    }
}
