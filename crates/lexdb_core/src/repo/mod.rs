//! Repository layer: entry writer, row aggregator and lexicon administration.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQL and transaction details from services and the registry.
//!
//! # Invariants
//! - Repository writes enforce `Entry::validate()` before persistence.
//! - Repository APIs return semantic errors (`LexiconNotFound`,
//!   `DuplicateTag`, ...) in addition to backend errors, each classified by
//!   [`ErrorKind`].

pub mod entry_repo;
pub mod error;
pub mod lexicon_repo;
pub mod scan;
mod tx;
mod writer;

pub use entry_repo::{EntryRepository, SqliteEntryRepository, UpdateOutcome, ValidationMode};
pub use error::{ErrorKind, RepoError, RepoResult};
pub use lexicon_repo::{LexiconRepository, MoveReport, SqliteLexiconRepository};
pub use scan::{EntryAggregator, EntrySink, FnSink, JoinedRow, SingleEntry};
