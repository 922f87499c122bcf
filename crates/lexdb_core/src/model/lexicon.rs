//! Lexicon identity and cross-database naming.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Synthetic lexicon id assigned by the database.
pub type LexiconId = i64;

/// A named collection of entries sharing one symbol set and locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lexicon {
    pub id: LexiconId,
    pub name: String,
    pub symbol_set_name: String,
    pub locale: String,
}

/// Input for defining a lexicon; the id is assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLexicon {
    pub name: String,
    pub symbol_set_name: String,
    pub locale: String,
}

impl NewLexicon {
    pub fn new(
        name: impl Into<String>,
        symbol_set_name: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            symbol_set_name: symbol_set_name.into(),
            locale: locale.into(),
        }
    }
}

/// `database:lexicon` compound name used across registered databases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LexiconRef {
    pub database: String,
    pub lexicon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexiconRefParseError(pub String);

impl Display for LexiconRefParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid lexicon reference `{}`; expected `database:lexicon`",
            self.0
        )
    }
}

impl Error for LexiconRefParseError {}

impl LexiconRef {
    pub fn new(database: impl Into<String>, lexicon: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            lexicon: lexicon.into(),
        }
    }

    /// Parses `db:lexicon`. Both halves must be non-empty after trimming.
    pub fn parse(value: &str) -> Result<Self, LexiconRefParseError> {
        let Some((database, lexicon)) = value.split_once(':') else {
            return Err(LexiconRefParseError(value.to_string()));
        };
        let (database, lexicon) = (database.trim(), lexicon.trim());
        if database.is_empty() || lexicon.is_empty() || lexicon.contains(':') {
            return Err(LexiconRefParseError(value.to_string()));
        }
        Ok(Self::new(database, lexicon))
    }
}

impl Display for LexiconRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.database, self.lexicon)
    }
}

/// A lexicon together with the registered database that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedLexicon {
    pub database: String,
    pub lexicon: Lexicon,
}

impl QualifiedLexicon {
    pub fn reference(&self) -> LexiconRef {
        LexiconRef::new(self.database.clone(), self.lexicon.name.clone())
    }
}
