//! Declarative entry search and its SQL compiler.
//!
//! # Responsibility
//! - Describe sparse entry filters as a plain value ([`Query`]).
//! - Compile a query into one parameterized statement over the lexicon,
//!   entry, transcription, lemma, status, validation and comment tables.
//!
//! # Invariants
//! - A query without any content filter and without entry ids is rejected,
//!   never compiled into "select everything".
//! - Compiled statements order rows by entry id, then child row ids.

mod compiler;
mod filter;

pub use compiler::{
    compile_count_query, compile_entry_query, compile_id_query, CompiledQuery,
};
pub use filter::Query;

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No content filter and no entry id was given.
    Empty,
    /// Content filters were given without any lexicon to search in.
    NoLexicon,
    InvalidRegexp {
        field: &'static str,
        pattern: String,
        message: String,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(
                f,
                "empty query: set at least one filter or entry id (use Query::all_in for exports)"
            ),
            Self::NoLexicon => write!(f, "query has no lexicon to search in"),
            Self::InvalidRegexp {
                field,
                pattern,
                message,
            } => write!(f, "invalid regexp `{pattern}` for {field}: {message}"),
        }
    }
}

impl Error for QueryError {}
