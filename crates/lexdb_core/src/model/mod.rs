//! Lexicon entity model.
//!
//! # Responsibility
//! - Define the in-memory shape of lexicons and entry aggregates.
//! - Provide write-time invariant checks (`Entry::validate`).
//!
//! # Invariants
//! - Every persisted entry owns at least one transcription.
//! - Child records (transcriptions, statuses, validations, comments, tag)
//!   live and die with their owning entry.

pub mod entry;
pub mod lexicon;
pub mod stats;
