//! Search filter value object.

use crate::model::entry::EntryId;
use serde::{Deserialize, Serialize};

/// Sparse entry filter. Unset (`None`/empty/`false`) fields do not constrain.
///
/// `*_like` fields take SQL `LIKE` patterns, `*_regexp` fields take regular
/// expressions evaluated by the dialect's `REGEXP` operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    /// Lexicon names to search within.
    pub lexicons: Vec<String>,
    /// Exact orthographies.
    pub words: Vec<String>,
    pub word_like: Option<String>,
    pub word_regexp: Option<String>,
    pub part_of_speech_like: Option<String>,
    pub part_of_speech_regexp: Option<String>,
    pub morphology_like: Option<String>,
    pub word_parts_like: Option<String>,
    pub transcription_like: Option<String>,
    pub transcription_regexp: Option<String>,
    pub lemma_like: Option<String>,
    pub lemma_regexp: Option<String>,
    pub reading_like: Option<String>,
    pub reading_regexp: Option<String>,
    pub paradigm_like: Option<String>,
    pub paradigm_regexp: Option<String>,
    pub tag_like: Option<String>,
    pub comment_label_like: Option<String>,
    pub comment_source_like: Option<String>,
    pub comment_like: Option<String>,
    pub validation_rule_like: Option<String>,
    pub validation_level_like: Option<String>,
    /// Only entries with at least one stored validation finding.
    pub has_validation: bool,
    /// Explicit entry ids; with ids the lexicon filter becomes optional.
    pub entry_ids: Vec<EntryId>,
    /// Current status names.
    pub statuses: Vec<String>,
    pub preferred_only: bool,
    /// Only entries with more than one transcription.
    pub multiple_transcriptions: bool,
    /// Zero-based page index, used only when `page_length > 0`.
    pub page: u32,
    /// Entries per page; `0` means no limit.
    pub page_length: u32,
}

impl Query {
    /// Every entry of the given lexicons. This is the explicit opt-in for
    /// bulk export; a query with only lexicons set is rejected as empty.
    pub fn all_in<I, S>(lexicons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lexicons: lexicons.into_iter().map(Into::into).collect(),
            word_like: Some("%".to_string()),
            ..Self::default()
        }
    }

    /// Exactly the given entries, in any lexicon.
    pub fn by_ids(ids: impl IntoIterator<Item = EntryId>) -> Self {
        Self {
            entry_ids: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn in_lexicon(mut self, lexicon: impl Into<String>) -> Self {
        self.lexicons.push(lexicon.into());
        self
    }

    pub fn with_paging(mut self, page: u32, page_length: u32) -> Self {
        self.page = page;
        self.page_length = page_length;
        self
    }

    /// True when no content filter is set. Lexicons and paging do not count.
    pub fn is_empty(&self) -> bool {
        let unset = |value: &Option<String>| value.as_deref().map_or(true, str::is_empty);

        self.words.is_empty()
            && unset(&self.word_like)
            && unset(&self.word_regexp)
            && unset(&self.part_of_speech_like)
            && unset(&self.part_of_speech_regexp)
            && unset(&self.morphology_like)
            && unset(&self.word_parts_like)
            && unset(&self.transcription_like)
            && unset(&self.transcription_regexp)
            && unset(&self.lemma_like)
            && unset(&self.lemma_regexp)
            && unset(&self.reading_like)
            && unset(&self.reading_regexp)
            && unset(&self.paradigm_like)
            && unset(&self.paradigm_regexp)
            && unset(&self.tag_like)
            && unset(&self.comment_label_like)
            && unset(&self.comment_source_like)
            && unset(&self.comment_like)
            && unset(&self.validation_rule_like)
            && unset(&self.validation_level_like)
            && !self.has_validation
            && self.statuses.is_empty()
            && !self.preferred_only
            && !self.multiple_transcriptions
    }
}

#[cfg(test)]
mod tests {
    use super::Query;

    #[test]
    fn default_query_is_empty() {
        assert!(Query::default().is_empty());
        assert!(Query::default().in_lexicon("sv").is_empty());
    }

    #[test]
    fn blank_strings_do_not_count_as_filters() {
        let query = Query {
            word_like: Some(String::new()),
            ..Query::default()
        };
        assert!(query.is_empty());
    }

    #[test]
    fn all_in_is_not_empty() {
        let query = Query::all_in(["sv"]);
        assert!(!query.is_empty());
        assert_eq!(query.lexicons, vec!["sv"]);
    }

    #[test]
    fn sparse_json_fills_defaults() {
        let query: Query =
            serde_json::from_str(r#"{"lexicons":["sv"],"wordLike":"ka%","page":2}"#).unwrap();
        assert_eq!(query.lexicons, vec!["sv"]);
        assert_eq!(query.word_like.as_deref(), Some("ka%"));
        assert_eq!(query.page, 2);
        assert_eq!(query.page_length, 0);
        assert!(query.statuses.is_empty());
    }
}
