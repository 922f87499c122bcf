//! Repository error taxonomy.

use crate::db::DbError;
use crate::model::entry::{EntryId, EntryValidationError};
use crate::model::lexicon::LexiconId;
use crate::query::QueryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Coarse classification of every [`RepoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced lexicon, entry or lemma does not exist.
    NotFound,
    /// The request would break a lexicon invariant or is malformed.
    InvariantViolation,
    /// Connection, transaction or driver failure.
    Backend,
}

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Query(QueryError),
    Validation(EntryValidationError),
    LexiconNotFound(String),
    LexiconIdNotFound(LexiconId),
    EntryNotFound(EntryId),
    DuplicateLexicon(String),
    /// Lexicon names must be non-blank and free of `:`.
    InvalidLexiconName(String),
    LexiconNotEmpty {
        name: String,
        entries: i64,
    },
    /// Another homograph in the same lexicon already carries this tag.
    DuplicateTag {
        tag: String,
        word_form: String,
        lexicon_id: LexiconId,
        bound_to: EntryId,
    },
    /// `update_entry` was asked to change a field it never writes.
    ImmutableField {
        entry_id: EntryId,
        field: &'static str,
    },
    /// Status stamping and lexicon re-pointing disagreed during a move.
    MoveMismatch {
        from: String,
        to: String,
        stamped: usize,
        moved: usize,
    },
    /// Backend failure with the operation and target it happened in.
    Backend {
        operation: &'static str,
        target: String,
        source: DbError,
    },
    /// Rolling back after `original` failed as well.
    RollbackFailed {
        operation: &'static str,
        original: Box<RepoError>,
        rollback: rusqlite::Error,
    },
    InvalidData(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LexiconNotFound(_) | Self::LexiconIdNotFound(_) | Self::EntryNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Query(_)
            | Self::Validation(_)
            | Self::DuplicateLexicon(_)
            | Self::InvalidLexiconName(_)
            | Self::LexiconNotEmpty { .. }
            | Self::DuplicateTag { .. }
            | Self::ImmutableField { .. }
            | Self::MoveMismatch { .. } => ErrorKind::InvariantViolation,
            Self::RollbackFailed { original, .. } => original.kind(),
            Self::Db(_) | Self::Backend { .. } | Self::InvalidData(_) => ErrorKind::Backend,
        }
    }

    /// Attaches operation/target context to bare backend errors.
    pub(crate) fn in_operation(self, operation: &'static str, target: &str) -> Self {
        match self {
            Self::Db(source) => Self::Backend {
                operation,
                target: target.to_string(),
                source,
            },
            other => other,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::LexiconNotFound(name) => write!(f, "lexicon not found: {name}"),
            Self::LexiconIdNotFound(id) => write!(f, "lexicon not found: id {id}"),
            Self::EntryNotFound(id) => write!(f, "entry not found: {id}"),
            Self::DuplicateLexicon(name) => write!(f, "lexicon already exists: {name}"),
            Self::InvalidLexiconName(name) => write!(f, "invalid lexicon name: `{name}`"),
            Self::LexiconNotEmpty { name, entries } => write!(
                f,
                "lexicon `{name}` still owns {entries} entries and cannot be deleted"
            ),
            Self::DuplicateTag {
                tag,
                word_form,
                lexicon_id,
                bound_to,
            } => write!(
                f,
                "tag `{tag}` is already bound to entry {bound_to} with wordform `{word_form}` in lexicon {lexicon_id}"
            ),
            Self::ImmutableField { entry_id, field } => {
                write!(f, "entry {entry_id}: field `{field}` cannot be changed by update")
            }
            Self::MoveMismatch {
                from,
                to,
                stamped,
                moved,
            } => write!(
                f,
                "moving new entries from `{from}` to `{to}` stamped {stamped} statuses but moved {moved} entries"
            ),
            Self::Backend {
                operation,
                target,
                source,
            } => write!(f, "{operation} failed for {target}: {source}"),
            Self::RollbackFailed {
                operation,
                original,
                rollback,
            } => write!(f, "{original}; rollback of {operation} also failed: {rollback}"),
            Self::InvalidData(message) => write!(f, "invalid persisted lexicon data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Backend { source, .. } => Some(source),
            Self::RollbackFailed { original, .. } => Some(original.as_ref()),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<EntryValidationError> for RepoError {
    fn from(value: EntryValidationError) -> Self {
        Self::Validation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, RepoError};
    use crate::db::DbError;
    use crate::query::QueryError;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(RepoError::EntryNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(
            RepoError::Query(QueryError::Empty).kind(),
            ErrorKind::InvariantViolation
        );
        assert_eq!(
            RepoError::Db(DbError::UnsupportedDialect("mariadb")).kind(),
            ErrorKind::Backend
        );
    }

    #[test]
    fn in_operation_wraps_only_backend_errors() {
        let wrapped = RepoError::Db(DbError::UnsupportedDialect("mariadb"))
            .in_operation("insert_entries", "lexicon sv");
        assert!(wrapped.to_string().starts_with("insert_entries failed for lexicon sv"));

        let untouched = RepoError::EntryNotFound(9).in_operation("update_entry", "entry 9");
        assert!(matches!(untouched, RepoError::EntryNotFound(9)));
    }
}
