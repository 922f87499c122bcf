//! Core storage engine for pronunciation lexicons.
//! This crate is the single source of truth for lexicon invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod registry;
pub mod repo;
pub mod service;

pub use db::{
    open_db, open_db_in_memory, open_db_in_memory_with, open_db_with, Database, DatabaseOptions,
    DbError, Dialect, MariaDbDialect, SqliteDialect,
};
pub use logging::{
    default_log_level, flush_logs, init_logging, init_logging_with, logging_status, FacadeSink,
    LogSink, LoggingConfig, LoggingError, SilentSink, StderrSink, StdoutSink,
};
pub use model::entry::{
    Entry, EntryComment, EntryId, EntryStatus, EntryValidation, EntryValidationError, Lemma,
    Transcription,
};
pub use model::lexicon::{Lexicon, LexiconId, LexiconRef, NewLexicon, QualifiedLexicon};
pub use model::stats::{LexiconStats, ValidationStats};
pub use query::{Query, QueryError};
pub use registry::{
    LexiconRegistry, ListCancellation, QualifiedEntry, RegistryError, RegistryOptions,
};
pub use repo::{
    EntryRepository, ErrorKind, LexiconRepository, MoveReport, RepoError, RepoResult,
    SqliteEntryRepository, SqliteLexiconRepository, UpdateOutcome, ValidationMode,
};
pub use service::import_service::{ImportError, ImportOptions, ImportReport, ImportService};
pub use service::stats_service::StatsService;
pub use service::validation_service::{
    EntryValidator, RevalidationOptions, RevalidationReport, ValidationService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
