//! Memoized `REGEXP` support for SQLite.
//!
//! SQLite rewrites `X REGEXP Y` into `regexp(Y, X)`, so the pattern arrives
//! first. Compiled patterns are cached process-wide behind a mutex so a scan
//! over many rows compiles each pattern once.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Mutex;

const MAX_CACHED_PATTERNS: usize = 256;

static REGEXP_CACHE: Lazy<Mutex<HashMap<String, Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(super) fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: String = ctx.get(0)?;
            let Some(text) = ctx.get::<Option<String>>(1)? else {
                return Ok(false);
            };
            regexp_is_match(&pattern, &text)
                .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))
        },
    )
}

/// Matches `text` against `pattern`, compiling the pattern at most once.
pub fn regexp_is_match(pattern: &str, text: &str) -> Result<bool, regex::Error> {
    let mut cache = REGEXP_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(re) = cache.get(pattern) {
        return Ok(re.is_match(text));
    }

    let re = Regex::new(pattern)?;
    let matched = re.is_match(text);
    if cache.len() >= MAX_CACHED_PATTERNS {
        cache.clear();
    }
    cache.insert(pattern.to_string(), re);
    Ok(matched)
}

/// Number of compiled patterns currently cached.
pub fn regexp_cache_len() -> usize {
    REGEXP_CACHE
        .lock()
        .map(|cache| cache.len())
        .unwrap_or_else(|poisoned| poisoned.into_inner().len())
}
