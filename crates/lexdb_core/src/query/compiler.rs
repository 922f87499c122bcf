//! Query-to-SQL compiler.
//!
//! Each filter group (lexicons, entry ids, words, lemmas, transcriptions) has
//! its own builder that yields a fragment only when the group has at least
//! one criterion. Fragments are joined with `AND` inside an id subquery; the
//! subquery carries paging so `LIMIT` counts entries, not fanned-out rows.

use super::{Query, QueryError, QueryResult};
use crate::db::Dialect;
use regex::Regex;
use rusqlite::types::Value;

const ENTRY_SELECT_COLUMNS: &str = "
    Lexicon.id AS lexicon_id,
    Entry.id AS entry_id,
    Entry.strn AS entry_strn,
    Entry.language AS entry_language,
    Entry.partOfSpeech AS part_of_speech,
    Entry.morphology AS morphology,
    Entry.wordParts AS word_parts,
    Entry.preferred AS preferred,
    EntryTag.tag AS tag,
    Transcription.id AS transcription_id,
    Transcription.strn AS transcription_strn,
    Transcription.language AS transcription_language,
    Transcription.sources AS transcription_sources,
    Lemma.id AS lemma_id,
    Lemma.strn AS lemma_strn,
    Lemma.reading AS lemma_reading,
    Lemma.paradigm AS lemma_paradigm,
    EntryStatus.id AS status_id,
    EntryStatus.name AS status_name,
    EntryStatus.source AS status_source,
    EntryStatus.timestamp AS status_timestamp,
    EntryStatus.isCurrent AS status_current,
    EntryValidation.id AS validation_id,
    EntryValidation.level AS validation_level,
    EntryValidation.name AS validation_rule,
    EntryValidation.message AS validation_message,
    EntryValidation.timestamp AS validation_timestamp,
    EntryComment.id AS comment_id,
    EntryComment.label AS comment_label,
    EntryComment.source AS comment_source,
    EntryComment.comment AS comment_text";

const ENTRY_JOINS: &str = "
INNER JOIN Entry ON Entry.id = page.id
INNER JOIN Lexicon ON Lexicon.id = Entry.lexiconId
INNER JOIN Transcription ON Transcription.entryId = Entry.id
LEFT JOIN EntryTag ON EntryTag.entryId = Entry.id
LEFT JOIN Lemma2Entry ON Lemma2Entry.entryId = Entry.id
LEFT JOIN Lemma ON Lemma.id = Lemma2Entry.lemmaId
LEFT JOIN EntryStatus ON EntryStatus.entryId = Entry.id AND EntryStatus.isCurrent = 1
LEFT JOIN EntryValidation ON EntryValidation.entryId = Entry.id
LEFT JOIN EntryComment ON EntryComment.entryId = Entry.id";

const ENTRY_ORDER: &str =
    "ORDER BY Entry.id, Transcription.id, EntryValidation.id, EntryComment.id";

/// SQL text plus positional parameters, in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Default)]
struct Fragment {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl Fragment {
    fn push(&mut self, condition: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.conditions.push(condition.into());
        self.params.extend(params);
    }

    fn push_bare(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }

    fn into_option(self) -> Option<Self> {
        if self.conditions.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn joined(&self) -> String {
        self.conditions.join(" AND ")
    }
}

/// Compiles the full entry select: one row per transcription x lemma x
/// current status x validation x comment of every matching entry.
pub fn compile_entry_query(query: &Query, dialect: &dyn Dialect) -> QueryResult<CompiledQuery> {
    let ids = compile_id_query(query, dialect)?;
    Ok(CompiledQuery {
        sql: format!(
            "SELECT{ENTRY_SELECT_COLUMNS}\nFROM ({}) AS page{ENTRY_JOINS}\n{ENTRY_ORDER}",
            ids.sql
        ),
        params: ids.params,
    })
}

/// Compiles the ordered, paged list of matching entry ids.
pub fn compile_id_query(query: &Query, dialect: &dyn Dialect) -> QueryResult<CompiledQuery> {
    let mut compiled = compile_unpaged_ids(query, dialect)?;
    if query.page_length > 0 {
        compiled.sql.push_str(" LIMIT ? OFFSET ?");
        compiled
            .params
            .push(Value::Integer(i64::from(query.page_length)));
        compiled.params.push(Value::Integer(
            i64::from(query.page) * i64::from(query.page_length),
        ));
    }
    Ok(compiled)
}

/// Compiles a count of all matching entries, ignoring paging.
pub fn compile_count_query(query: &Query, dialect: &dyn Dialect) -> QueryResult<CompiledQuery> {
    let ids = compile_unpaged_ids(query, dialect)?;
    Ok(CompiledQuery {
        sql: format!("SELECT COUNT(*) FROM ({}) AS matched", ids.sql),
        params: ids.params,
    })
}

fn compile_unpaged_ids(query: &Query, dialect: &dyn Dialect) -> QueryResult<CompiledQuery> {
    if query.is_empty() && query.entry_ids.is_empty() {
        return Err(QueryError::Empty);
    }
    if query.entry_ids.is_empty() && query.lexicons.is_empty() {
        return Err(QueryError::NoLexicon);
    }
    check_regexps(query)?;

    let regexp = dialect.regexp_operator();
    let groups = [
        lexicon_fragment(query),
        entry_id_fragment(query),
        word_fragment(query, regexp),
        lemma_fragment(query, regexp),
        transcription_fragment(query, regexp),
    ];

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for fragment in groups.into_iter().flatten() {
        conditions.push(fragment.joined());
        params.extend(fragment.params);
    }

    Ok(CompiledQuery {
        sql: format!(
            "SELECT Entry.id AS id FROM Entry INNER JOIN Lexicon ON Lexicon.id = Entry.lexiconId WHERE {} ORDER BY Entry.id",
            conditions.join(" AND ")
        ),
        params,
    })
}

fn lexicon_fragment(query: &Query) -> Option<Fragment> {
    let mut fragment = Fragment::default();
    if !query.lexicons.is_empty() {
        fragment.push(
            format!("Lexicon.name IN ({})", placeholders(query.lexicons.len())),
            query.lexicons.iter().cloned().map(Value::Text),
        );
    }
    fragment.into_option()
}

fn entry_id_fragment(query: &Query) -> Option<Fragment> {
    let mut fragment = Fragment::default();
    if !query.entry_ids.is_empty() {
        fragment.push(
            format!("Entry.id IN ({})", placeholders(query.entry_ids.len())),
            query.entry_ids.iter().copied().map(Value::Integer),
        );
    }
    fragment.into_option()
}

fn word_fragment(query: &Query, regexp: &str) -> Option<Fragment> {
    let mut fragment = Fragment::default();

    if !query.words.is_empty() {
        fragment.push(
            format!("Entry.strn IN ({})", placeholders(query.words.len())),
            query.words.iter().cloned().map(Value::Text),
        );
    }
    push_pattern(&mut fragment, "Entry.strn LIKE ?", &query.word_like);
    push_pattern(
        &mut fragment,
        &format!("Entry.strn {regexp} ?"),
        &query.word_regexp,
    );
    push_pattern(
        &mut fragment,
        "Entry.partOfSpeech LIKE ?",
        &query.part_of_speech_like,
    );
    push_pattern(
        &mut fragment,
        &format!("Entry.partOfSpeech {regexp} ?"),
        &query.part_of_speech_regexp,
    );
    push_pattern(&mut fragment, "Entry.morphology LIKE ?", &query.morphology_like);
    push_pattern(&mut fragment, "Entry.wordParts LIKE ?", &query.word_parts_like);

    if query.preferred_only {
        fragment.push_bare("Entry.preferred = 1");
    }
    if query.multiple_transcriptions {
        fragment.push_bare("(SELECT COUNT(*) FROM Transcription mt WHERE mt.entryId = Entry.id) > 1");
    }
    if !query.statuses.is_empty() {
        fragment.push(
            format!(
                "EXISTS (SELECT 1 FROM EntryStatus es WHERE es.entryId = Entry.id AND es.isCurrent = 1 AND es.name IN ({}))",
                placeholders(query.statuses.len())
            ),
            query.statuses.iter().cloned().map(Value::Text),
        );
    }
    push_pattern(
        &mut fragment,
        "EXISTS (SELECT 1 FROM EntryTag et WHERE et.entryId = Entry.id AND et.tag LIKE ?)",
        &query.tag_like,
    );

    let mut comment = Fragment::default();
    push_pattern(&mut comment, "ec.label LIKE ?", &query.comment_label_like);
    push_pattern(&mut comment, "ec.source LIKE ?", &query.comment_source_like);
    push_pattern(&mut comment, "ec.comment LIKE ?", &query.comment_like);
    if let Some(comment) = comment.into_option() {
        fragment.push(
            format!(
                "EXISTS (SELECT 1 FROM EntryComment ec WHERE ec.entryId = Entry.id AND {})",
                comment.joined()
            ),
            comment.params,
        );
    }

    let mut validation = Fragment::default();
    push_pattern(&mut validation, "ev.name LIKE ?", &query.validation_rule_like);
    push_pattern(&mut validation, "ev.level LIKE ?", &query.validation_level_like);
    match validation.into_option() {
        Some(validation) => fragment.push(
            format!(
                "EXISTS (SELECT 1 FROM EntryValidation ev WHERE ev.entryId = Entry.id AND {})",
                validation.joined()
            ),
            validation.params,
        ),
        None if query.has_validation => fragment
            .push_bare("EXISTS (SELECT 1 FROM EntryValidation ev WHERE ev.entryId = Entry.id)"),
        None => {}
    }

    fragment.into_option()
}

fn lemma_fragment(query: &Query, regexp: &str) -> Option<Fragment> {
    let mut lemma = Fragment::default();
    push_pattern(&mut lemma, "lm.strn LIKE ?", &query.lemma_like);
    push_pattern(&mut lemma, &format!("lm.strn {regexp} ?"), &query.lemma_regexp);
    push_pattern(&mut lemma, "lm.reading LIKE ?", &query.reading_like);
    push_pattern(
        &mut lemma,
        &format!("lm.reading {regexp} ?"),
        &query.reading_regexp,
    );
    push_pattern(&mut lemma, "lm.paradigm LIKE ?", &query.paradigm_like);
    push_pattern(
        &mut lemma,
        &format!("lm.paradigm {regexp} ?"),
        &query.paradigm_regexp,
    );

    let lemma = lemma.into_option()?;
    let mut fragment = Fragment::default();
    fragment.push(
        format!(
            "EXISTS (SELECT 1 FROM Lemma2Entry le INNER JOIN Lemma lm ON lm.id = le.lemmaId WHERE le.entryId = Entry.id AND {})",
            lemma.joined()
        ),
        lemma.params,
    );
    Some(fragment)
}

fn transcription_fragment(query: &Query, regexp: &str) -> Option<Fragment> {
    let mut transcription = Fragment::default();
    push_pattern(&mut transcription, "tr.strn LIKE ?", &query.transcription_like);
    push_pattern(
        &mut transcription,
        &format!("tr.strn {regexp} ?"),
        &query.transcription_regexp,
    );

    let transcription = transcription.into_option()?;
    let mut fragment = Fragment::default();
    fragment.push(
        format!(
            "EXISTS (SELECT 1 FROM Transcription tr WHERE tr.entryId = Entry.id AND {})",
            transcription.joined()
        ),
        transcription.params,
    );
    Some(fragment)
}

fn push_pattern(fragment: &mut Fragment, condition: &str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|value| !value.is_empty()) {
        fragment.push(condition, [Value::Text(value.to_string())]);
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn check_regexps(query: &Query) -> QueryResult<()> {
    let patterns = [
        ("word_regexp", &query.word_regexp),
        ("part_of_speech_regexp", &query.part_of_speech_regexp),
        ("transcription_regexp", &query.transcription_regexp),
        ("lemma_regexp", &query.lemma_regexp),
        ("reading_regexp", &query.reading_regexp),
        ("paradigm_regexp", &query.paradigm_regexp),
    ];
    for (field, pattern) in patterns {
        let Some(pattern) = pattern.as_deref().filter(|value| !value.is_empty()) else {
            continue;
        };
        if let Err(err) = Regex::new(pattern) {
            return Err(QueryError::InvalidRegexp {
                field,
                pattern: pattern.to_string(),
                message: err.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{compile_count_query, compile_entry_query, compile_id_query};
    use crate::db::SqliteDialect;
    use crate::query::{Query, QueryError};
    use rusqlite::types::Value;

    #[test]
    fn empty_query_is_rejected() {
        let err = compile_entry_query(&Query::default(), &SqliteDialect::new()).unwrap_err();
        assert_eq!(err, QueryError::Empty);

        let only_lexicon = Query::default().in_lexicon("sv");
        let err = compile_entry_query(&only_lexicon, &SqliteDialect::new()).unwrap_err();
        assert_eq!(err, QueryError::Empty);
    }

    #[test]
    fn content_filter_without_lexicon_is_rejected() {
        let query = Query {
            word_like: Some("a%".to_string()),
            ..Query::default()
        };
        let err = compile_id_query(&query, &SqliteDialect::new()).unwrap_err();
        assert_eq!(err, QueryError::NoLexicon);
    }

    #[test]
    fn entry_ids_make_lexicon_optional() {
        let compiled = compile_id_query(&Query::by_ids([3, 5]), &SqliteDialect::new()).unwrap();
        assert!(compiled.sql.contains("Entry.id IN (?,?)"));
        assert!(!compiled.sql.contains("Lexicon.name IN"));
        assert_eq!(compiled.params, vec![Value::Integer(3), Value::Integer(5)]);
    }

    #[test]
    fn fragments_are_joined_in_group_order_with_params() {
        let query = Query {
            lexicons: vec!["sv".to_string(), "nb".to_string()],
            words: vec!["apa".to_string()],
            transcription_like: Some("%p%".to_string()),
            lemma_like: Some("ap%".to_string()),
            ..Query::default()
        };
        let compiled = compile_id_query(&query, &SqliteDialect::new()).unwrap();
        assert!(compiled.sql.contains("Lexicon.name IN (?,?) AND Entry.strn IN (?)"));
        assert!(compiled.sql.contains("lm.strn LIKE ?"));
        assert!(compiled.sql.contains("tr.strn LIKE ?"));
        assert_eq!(
            compiled.params,
            vec![
                Value::Text("sv".to_string()),
                Value::Text("nb".to_string()),
                Value::Text("apa".to_string()),
                Value::Text("ap%".to_string()),
                Value::Text("%p%".to_string()),
            ]
        );
    }

    #[test]
    fn regexp_filters_use_dialect_operator() {
        let query = Query {
            word_regexp: Some("^a".to_string()),
            ..Query::default()
        }
        .in_lexicon("sv");
        let compiled = compile_id_query(&query, &SqliteDialect::new()).unwrap();
        assert!(compiled.sql.contains("Entry.strn REGEXP ?"));
    }

    #[test]
    fn invalid_regexp_is_rejected_before_sql() {
        let query = Query {
            transcription_regexp: Some("(".to_string()),
            ..Query::default()
        }
        .in_lexicon("sv");
        let err = compile_id_query(&query, &SqliteDialect::new()).unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidRegexp {
                field: "transcription_regexp",
                ..
            }
        ));
    }

    #[test]
    fn paging_is_applied_only_with_page_length() {
        let unpaged = compile_id_query(&Query::all_in(["sv"]), &SqliteDialect::new()).unwrap();
        assert!(!unpaged.sql.contains("LIMIT"));

        let paged = compile_id_query(
            &Query::all_in(["sv"]).with_paging(2, 25),
            &SqliteDialect::new(),
        )
        .unwrap();
        assert!(paged.sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(
            &paged.params[paged.params.len() - 2..],
            &[Value::Integer(25), Value::Integer(50)]
        );
    }

    #[test]
    fn entry_query_orders_by_entry_then_children() {
        let compiled = compile_entry_query(&Query::all_in(["sv"]), &SqliteDialect::new()).unwrap();
        assert!(compiled
            .sql
            .ends_with("ORDER BY Entry.id, Transcription.id, EntryValidation.id, EntryComment.id"));
        assert!(compiled.sql.contains("LEFT JOIN EntryComment"));
    }

    #[test]
    fn count_ignores_paging() {
        let compiled = compile_count_query(
            &Query::all_in(["sv"]).with_paging(1, 10),
            &SqliteDialect::new(),
        )
        .unwrap();
        assert!(compiled.sql.starts_with("SELECT COUNT(*)"));
        assert!(!compiled.sql.contains("LIMIT"));
    }

    #[test]
    fn has_validation_without_rule_filter_uses_plain_exists() {
        let query = Query {
            has_validation: true,
            ..Query::default()
        }
        .in_lexicon("sv");
        let compiled = compile_id_query(&query, &SqliteDialect::new()).unwrap();
        assert!(compiled
            .sql
            .contains("EXISTS (SELECT 1 FROM EntryValidation ev WHERE ev.entryId = Entry.id)"));
    }
}
