//! Per-lexicon statistics value objects.

use super::entry::EntryValidation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts of validation findings over a set of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationStats {
    /// Entries the findings were collected from.
    pub validated_entries: i64,
    /// Entries with at least one finding.
    pub entries_with_findings: i64,
    pub total_findings: i64,
    /// Finding count per severity level.
    pub by_level: BTreeMap<String, i64>,
    /// Finding count per rule name, then per level.
    pub by_rule: BTreeMap<String, BTreeMap<String, i64>>,
}

impl ValidationStats {
    /// Folds the findings of one validated entry into the totals.
    pub fn record(&mut self, findings: &[EntryValidation]) {
        self.validated_entries += 1;
        if findings.is_empty() {
            return;
        }
        self.entries_with_findings += 1;
        for finding in findings {
            self.add_findings(&finding.rule_name, &finding.level, 1);
        }
    }

    /// Adds `count` findings of (`rule_name`, `level`).
    pub fn add_findings(&mut self, rule_name: &str, level: &str, count: i64) {
        self.total_findings += count;
        *self.by_level.entry(level.to_string()).or_default() += count;
        *self
            .by_rule
            .entry(rule_name.to_string())
            .or_default()
            .entry(level.to_string())
            .or_default() += count;
    }

    /// Finding count for one (rule, level) pair.
    pub fn rule_count(&self, rule_name: &str, level: &str) -> i64 {
        self.by_rule
            .get(rule_name)
            .and_then(|levels| levels.get(level))
            .copied()
            .unwrap_or(0)
    }
}

/// Summary of one lexicon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LexiconStats {
    pub lexicon: String,
    pub entries: i64,
    /// Current status name to number of entries in that status.
    pub statuses: BTreeMap<String, i64>,
    /// Present only when findings were computed or read.
    pub validation: Option<ValidationStats>,
}
