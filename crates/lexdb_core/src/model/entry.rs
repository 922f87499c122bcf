//! Entry aggregate and its owned child records.
//!
//! # Responsibility
//! - Define the canonical entry record returned by searches and accepted by
//!   the writer.
//! - Define structural equality for value-like children so the writer can
//!   diff without looking at synthetic ids.
//!
//! # Invariants
//! - `transcriptions` is never empty for a persisted entry.
//! - `status` is the current status only; history is read separately.
//! - `tag`, `lemma` and `status` are `None` rather than empty placeholders.

use super::lexicon::LexiconId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Synthetic entry id assigned by the database. `0` means not yet stored.
pub type EntryId = i64;

/// Separator used to persist transcription sources in one column.
pub const SOURCE_SEPARATOR: char = ',';

/// One orthographic wordform's full record within a lexicon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Entry {
    pub id: EntryId,
    pub lexicon_id: LexiconId,
    pub strn: String,
    pub language: String,
    pub part_of_speech: String,
    pub morphology: String,
    pub word_parts: String,
    pub preferred: bool,
    /// Homograph disambiguation label.
    pub tag: Option<String>,
    pub transcriptions: Vec<Transcription>,
    pub lemma: Option<Lemma>,
    pub status: Option<EntryStatus>,
    pub validations: Vec<EntryValidation>,
    pub comments: Vec<EntryComment>,
}

/// One phonetic rendering of an entry.
///
/// Equality is structural: `id` and `entry_id` are ignored.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transcription {
    pub id: i64,
    pub entry_id: EntryId,
    pub strn: String,
    pub language: String,
    pub sources: Vec<String>,
}

impl PartialEq for Transcription {
    fn eq(&self, other: &Self) -> bool {
        self.strn == other.strn && self.language == other.language && self.sources == other.sources
    }
}

impl Transcription {
    pub fn new(strn: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            strn: strn.into(),
            language: language.into(),
            ..Self::default()
        }
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn sources_column(&self) -> String {
        self.sources.join(&SOURCE_SEPARATOR.to_string())
    }

    pub(crate) fn parse_sources(column: &str) -> Vec<String> {
        if column.is_empty() {
            return Vec::new();
        }
        column
            .split(SOURCE_SEPARATOR)
            .map(ToString::to_string)
            .collect()
    }
}

/// A (strn, reading, paradigm) triple shared by every entry that links it.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Lemma {
    pub id: i64,
    pub strn: String,
    pub reading: String,
    pub paradigm: String,
}

impl PartialEq for Lemma {
    fn eq(&self, other: &Self) -> bool {
        self.strn == other.strn && self.reading == other.reading && self.paradigm == other.paradigm
    }
}

impl Lemma {
    pub fn new(strn: impl Into<String>, reading: impl Into<String>) -> Self {
        Self {
            strn: strn.into(),
            reading: reading.into(),
            ..Self::default()
        }
    }
}

/// One row of an entry's status history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryStatus {
    pub id: i64,
    pub name: String,
    pub source: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub current: bool,
}

impl EntryStatus {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            current: true,
            ..Self::default()
        }
    }

    /// Same lifecycle state, ignoring id and timestamp.
    pub fn same_state(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source
    }
}

/// A machine-generated validation finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryValidation {
    pub id: i64,
    pub level: String,
    pub rule_name: String,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl EntryValidation {
    pub fn new(
        level: impl Into<String>,
        rule_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level: level.into(),
            rule_name: rule_name.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Same finding, ignoring id and timestamp.
    pub fn same_finding(&self, other: &Self) -> bool {
        self.level == other.level && self.rule_name == other.rule_name && self.message == other.message
    }
}

/// Free-form annotation. Equality ignores `id`.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryComment {
    pub id: i64,
    pub label: String,
    pub source: String,
    pub text: String,
}

impl PartialEq for EntryComment {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.source == other.source && self.text == other.text
    }
}

impl EntryComment {
    pub fn new(
        label: impl Into<String>,
        source: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Write-time invariant violations of a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValidationError {
    EmptyOrthography,
    NoTranscriptions { strn: String },
    EmptyTranscription { strn: String, index: usize },
    InvalidSource { strn: String, source: String },
    EmptyTag { strn: String },
    EmptyLemma { strn: String },
    EmptyStatusName { strn: String },
}

impl Display for EntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyOrthography => write!(f, "entry orthography cannot be empty"),
            Self::NoTranscriptions { strn } => {
                write!(f, "entry `{strn}` must have at least one transcription")
            }
            Self::EmptyTranscription { strn, index } => {
                write!(f, "entry `{strn}` has an empty transcription at index {index}")
            }
            Self::InvalidSource { strn, source } => write!(
                f,
                "entry `{strn}` has transcription source `{source}` containing `{SOURCE_SEPARATOR}`"
            ),
            Self::EmptyTag { strn } => write!(f, "entry `{strn}` has an empty tag"),
            Self::EmptyLemma { strn } => write!(f, "entry `{strn}` has a lemma without strn"),
            Self::EmptyStatusName { strn } => {
                write!(f, "entry `{strn}` has a status without name")
            }
        }
    }
}

impl Error for EntryValidationError {}

impl Entry {
    /// Creates an unsaved entry with one transcription.
    pub fn new(
        strn: impl Into<String>,
        language: impl Into<String>,
        transcription: impl Into<String>,
    ) -> Self {
        let language = language.into();
        Self {
            strn: strn.into(),
            transcriptions: vec![Transcription::new(transcription, language.clone())],
            language,
            ..Self::default()
        }
    }

    /// Checks the invariants every stored entry must satisfy.
    pub fn validate(&self) -> Result<(), EntryValidationError> {
        if self.strn.trim().is_empty() {
            return Err(EntryValidationError::EmptyOrthography);
        }
        if self.transcriptions.is_empty() {
            return Err(EntryValidationError::NoTranscriptions {
                strn: self.strn.clone(),
            });
        }
        for (index, transcription) in self.transcriptions.iter().enumerate() {
            if transcription.strn.trim().is_empty() {
                return Err(EntryValidationError::EmptyTranscription {
                    strn: self.strn.clone(),
                    index,
                });
            }
            if let Some(source) = transcription
                .sources
                .iter()
                .find(|source| source.contains(SOURCE_SEPARATOR))
            {
                return Err(EntryValidationError::InvalidSource {
                    strn: self.strn.clone(),
                    source: source.clone(),
                });
            }
        }
        if matches!(self.tag.as_deref(), Some(tag) if tag.trim().is_empty()) {
            return Err(EntryValidationError::EmptyTag {
                strn: self.strn.clone(),
            });
        }
        if matches!(&self.lemma, Some(lemma) if lemma.strn.trim().is_empty()) {
            return Err(EntryValidationError::EmptyLemma {
                strn: self.strn.clone(),
            });
        }
        if matches!(&self.status, Some(status) if status.name.trim().is_empty()) {
            return Err(EntryValidationError::EmptyStatusName {
                strn: self.strn.clone(),
            });
        }
        Ok(())
    }
}
