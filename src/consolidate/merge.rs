use crate::config::MergeConfig;
use crate::record::{is_blank_value, IdentityKey, Record};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// How an incoming value for one field combines with the existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    /// The incoming value replaces the existing one, blank or not
    #[default]
    Overwrite,
    /// A blank incoming value never replaces a non-blank existing one
    Sticky,
}

/// Field policies for a dataset
#[derive(Debug, Clone, Default)]
pub struct MergePolicy {
    default: FieldPolicy,
    sticky: HashSet<String>,
}

impl MergePolicy {
    pub fn new(default: FieldPolicy) -> Self {
        Self {
            default,
            sticky: HashSet::new(),
        }
    }

    pub fn with_sticky<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sticky.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new(config.default_policy).with_sticky(config.sticky_fields.iter().cloned())
    }

    pub fn policy_for(&self, field: &str) -> FieldPolicy {
        if self.sticky.contains(field) {
            FieldPolicy::Sticky
        } else {
            self.default
        }
    }
}

/// Counters describing one consolidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records read from the previous canonical dataset
    pub existing: usize,
    /// Records read from unit batches
    pub incoming: usize,
    /// Identity keys that were not in the previous dataset
    pub new_keys: usize,
    /// Records folded into a record with the same key
    pub merged: usize,
    /// Incoming records dropped because they had no identity key
    pub skipped_no_key: usize,
    /// Previous records without an identity key, carried over unchanged
    pub kept_no_key: usize,
    /// Records in the result
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consolidated {
    pub records: Vec<Record>,
    pub stats: MergeStats,
}

/// Folds `existing` and then each batch into one record per identity key
///
/// Records are merged field by field in input order according to `policy`;
/// fields missing from a later record are kept. The result lists keys in
/// the order they were first seen. Running the fold again over its own
/// output and the same batches returns the same records.
///
/// Existing records without an identity key stay in place untouched;
/// incoming ones are dropped.
pub fn consolidate<I>(
    existing: Vec<Record>,
    batches: I,
    identity: &dyn IdentityKey,
    policy: &MergePolicy,
) -> Consolidated
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut stats = MergeStats {
        existing: existing.len(),
        ..MergeStats::default()
    };
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut records: Vec<Record> = Vec::new();

    for record in existing {
        if identity.key(&record).is_none() {
            stats.kept_no_key += 1;
            records.push(record);
            continue;
        }
        fold(record, identity, policy, &mut index, &mut records, &mut stats);
    }
    let known_keys = index.len();

    for batch in batches {
        for record in batch {
            stats.incoming += 1;
            fold(record, identity, policy, &mut index, &mut records, &mut stats);
        }
    }

    stats.new_keys = index.len() - known_keys;
    stats.total = records.len();
    Consolidated { records, stats }
}

fn fold(
    record: Record,
    identity: &dyn IdentityKey,
    policy: &MergePolicy,
    index: &mut HashMap<String, usize>,
    records: &mut Vec<Record>,
    stats: &mut MergeStats,
) {
    let Some(key) = identity.key(&record) else {
        stats.skipped_no_key += 1;
        return;
    };

    match index.get(&key) {
        Some(&at) => {
            merge_into(&mut records[at], record, policy);
            stats.merged += 1;
        }
        None => {
            index.insert(key, records.len());
            records.push(record);
        }
    }
}

/// Merges `incoming` into `target` field by field
pub fn merge_into(target: &mut Record, incoming: Record, policy: &MergePolicy) {
    for (field, value) in incoming.into_map() {
        let keep_existing = policy.policy_for(&field) == FieldPolicy::Sticky
            && is_blank_value(Some(&value))
            && !target.is_blank(&field);
        if !keep_existing {
            target.insert(field, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldIdentity;
    use serde_json::{json, Value};

    fn player(name: &str, team: &str, extra: &[(&str, Value)]) -> Record {
        let mut record = Record::new().with("name", name).with("team", team);
        for (field, value) in extra {
            record.insert(*field, value.clone());
        }
        record
    }

    fn identity() -> FieldIdentity {
        FieldIdentity::new(["name", "team"])
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        let existing = vec![player("B", "t1", &[]), player("A", "t1", &[])];
        let batch = vec![player("C", "t2", &[]), player("A", "t1", &[("goals", json!(3))])];

        let out = consolidate(existing, vec![batch], &identity(), &MergePolicy::default());
        let names: Vec<_> = out.records.iter().map(|r| r.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(out.records[1].get("goals"), Some(&json!(3)));
        assert_eq!(out.stats.new_keys, 1);
        assert_eq!(out.stats.merged, 1);
        assert_eq!(out.stats.total, 3);
    }

    #[test]
    fn test_last_write_wins_for_overwrite_fields() {
        let batches = vec![
            vec![player("A", "t1", &[("number", json!("7"))])],
            vec![player("A", "t1", &[("number", json!(""))])],
        ];
        let out = consolidate(Vec::new(), batches, &identity(), &MergePolicy::default());
        assert_eq!(out.records[0].get("number"), Some(&json!("")));
    }

    #[test]
    fn test_sticky_field_survives_blank_incoming() {
        let policy = MergePolicy::default().with_sticky(["nickname"]);
        let existing = vec![player("A", "t1", &[("nickname", json!("Ace"))])];
        let batches = vec![
            vec![player("A", "t1", &[("nickname", json!("  "))])],
            vec![player("A", "t1", &[("nickname", Value::Null)])],
            vec![player("A", "t1", &[])],
        ];

        let out = consolidate(existing, batches, &identity(), &policy);
        assert_eq!(out.records[0].get_str("nickname"), Some("Ace"));
    }

    #[test]
    fn test_sticky_field_takes_non_blank_incoming() {
        let policy = MergePolicy::default().with_sticky(["nickname"]);
        let existing = vec![player("A", "t1", &[("nickname", json!("Ace"))])];
        let batches = vec![vec![player("A", "t1", &[("nickname", json!("Flash"))])]];

        let out = consolidate(existing, batches, &identity(), &policy);
        assert_eq!(out.records[0].get_str("nickname"), Some("Flash"));
    }

    #[test]
    fn test_sticky_default_policy() {
        let policy = MergePolicy::new(FieldPolicy::Sticky);
        let existing = vec![player("A", "t1", &[("number", json!("9"))])];
        let batches = vec![vec![player("A", "t1", &[("number", json!(""))])]];

        let out = consolidate(existing, batches, &identity(), &policy);
        assert_eq!(out.records[0].get_str("number"), Some("9"));
    }

    #[test]
    fn test_records_without_key_are_skipped() {
        let batch = vec![
            player("A", "t1", &[]),
            Record::new().with("name", "No Team"),
            player("", "t1", &[]),
        ];
        let out = consolidate(Vec::new(), vec![batch], &identity(), &MergePolicy::default());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.stats.skipped_no_key, 2);
    }

    #[test]
    fn test_existing_records_without_key_are_kept() {
        let existing = vec![
            player("Old", "t1", &[]),
            Record::new().with("name", "Legacy"),
        ];
        let batches = vec![vec![player("New", "t1", &[])]];

        let out = consolidate(existing, batches, &identity(), &MergePolicy::default());
        let names: Vec<_> = out.records.iter().map(|r| r.get_str("name")).collect();
        assert_eq!(names, vec![Some("Old"), Some("Legacy"), Some("New")]);
        assert_eq!(out.stats.kept_no_key, 1);
        assert_eq!(out.stats.skipped_no_key, 0);
        assert_eq!(out.stats.new_keys, 1);
        assert_eq!(out.stats.total, 3);
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let policy = MergePolicy::default().with_sticky(["nickname"]);
        let existing = vec![
            player("A", "t1", &[("nickname", json!("Ace"))]),
            player("A", "t1", &[("goals", json!(1))]),
        ];
        let batches = vec![
            vec![player("B", "t2", &[]), player("A", "t1", &[("nickname", json!(""))])],
            vec![player("C", "t2", &[("goals", json!(4))]), player("B", "t2", &[("goals", json!(2))])],
        ];

        let once = consolidate(existing, batches.clone(), &identity(), &policy);
        let twice = consolidate(once.records.clone(), batches, &identity(), &policy);
        assert_eq!(once.records, twice.records);
        assert_eq!(twice.stats.new_keys, 0);
    }
}
