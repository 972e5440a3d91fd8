//! Per-column type profile
//!
//! A profile accumulates, for one flat column, how often each type tag was seen
//! (in first-seen order) and a running fingerprint of the column's values so
//! structurally redundant columns can be found once the stream is read.

use crate::types::{self, TypeSet, TypeTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Fingerprint of a column that never held a non-null value.
pub(crate) const EMPTY_FINGERPRINT: [u8; 32] = [0; 32];

/// Occurrences of one type tag in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: TypeTag,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProfile {
    name: String,
    observations: Vec<TagCount>,
    #[serde(with = "hex")]
    fingerprint: [u8; 32],
    /// Set once a multi-choice column has been resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coerce_to: Option<TypeTag>,
}

impl ColumnProfile {
    /// A profile for a column first seen after `prior_rows` records without it.
    pub(crate) fn new(name: impl Into<String>, prior_rows: u64) -> Self {
        let mut profile = ColumnProfile {
            name: name.into(),
            observations: Vec::new(),
            fingerprint: EMPTY_FINGERPRINT,
            coerce_to: None,
        };
        profile.bump(TypeTag::Null, prior_rows);
        profile
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one value seen in row `row`.
    pub(crate) fn observe(&mut self, row: u64, tag: TypeTag, value: &Value) {
        self.bump(tag, 1);
        if tag == TypeTag::Null {
            // Explicit and implicit nulls must fingerprint identically
            return;
        }

        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint);
        hasher.update(row.to_le_bytes());
        hasher.update([tag as u8]);
        hasher.update(value.to_string().as_bytes());
        self.fingerprint = hasher.finalize().into();
    }

    /// Record rows that did not carry this column.
    pub(crate) fn observe_absent(&mut self, rows: u64) {
        self.bump(TypeTag::Null, rows);
    }

    fn bump(&mut self, tag: TypeTag, n: u64) {
        if n == 0 {
            return;
        }
        match self.observations.iter_mut().find(|o| o.tag == tag) {
            Some(existing) => existing.count += n,
            None => self.observations.push(TagCount { tag, count: n }),
        }
    }

    /// Tags in first-seen order with their counts.
    pub fn observations(&self) -> &[TagCount] {
        &self.observations
    }

    pub fn types(&self) -> TypeSet {
        self.observations.iter().map(|o| o.tag).collect()
    }

    pub fn count(&self, tag: TypeTag) -> u64 {
        self.observations
            .iter()
            .find(|o| o.tag == tag)
            .map_or(0, |o| o.count)
    }

    /// Total rows this profile has accounted for.
    pub fn occurrences(&self) -> u64 {
        self.observations.iter().map(|o| o.count).sum()
    }

    pub fn nullable(&self) -> bool {
        self.count(TypeTag::Null) > 0
    }

    pub fn is_multi_choice(&self) -> bool {
        types::is_multi_choice(self.types())
    }

    /// The single type this column is rendered as.
    pub fn data_type(&self) -> TypeTag {
        types::resolve_multi_choice(self.types())
    }

    /// The type values are coerced to on conversion, if the column was resolved.
    pub fn coerce_to(&self) -> Option<TypeTag> {
        self.coerce_to
    }

    pub(crate) fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// Collapse a multi-choice profile onto its resolved tag. Returns whether
    /// anything changed.
    pub(crate) fn resolve(&mut self) -> bool {
        if !self.is_multi_choice() {
            return false;
        }

        let target = self.data_type();
        let mut resolved: Vec<TagCount> = Vec::with_capacity(2);
        for observation in &self.observations {
            let tag = if observation.tag == TypeTag::Null {
                TypeTag::Null
            } else {
                target
            };
            match resolved.iter_mut().find(|o| o.tag == tag) {
                Some(existing) => existing.count += observation.count,
                None => resolved.push(TagCount {
                    tag,
                    count: observation.count,
                }),
            }
        }

        self.observations = resolved;
        self.coerce_to = Some(target);
        true
    }

    /// Add another shard's counts for the same column.
    pub(crate) fn absorb_counts(&mut self, other: &ColumnProfile) {
        for observation in &other.observations {
            self.bump(observation.tag, observation.count);
        }
        if self.coerce_to.is_none() {
            self.coerce_to = other.coerce_to;
        }
    }

    /// Fold one shard's fingerprint into this profile's.
    pub(crate) fn chain_fingerprint(&mut self, shard: &[u8; 32]) {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint);
        hasher.update(shard);
        self.fingerprint = hasher.finalize().into();
    }

    /// Convert a value to this column's type. Text columns turn numbers and
    /// booleans into their JSON text; other values pass through untouched.
    pub fn coerce(&self, value: Value) -> Value {
        let target = self.coerce_to.unwrap_or_else(|| self.data_type());
        match (target, value) {
            (TypeTag::String, Value::Bool(b)) => Value::String(b.to_string()),
            (TypeTag::String, Value::Number(n)) => Value::String(n.to_string()),
            (_, value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn observe(profile: &mut ColumnProfile, row: u64, value: Value) {
        let tag = types::classify(&value).unwrap();
        profile.observe(row, tag, &value);
    }

    #[test]
    fn test_first_seen_order_and_counts() {
        let mut profile = ColumnProfile::new("a", 0);
        observe(&mut profile, 0, json!("x"));
        observe(&mut profile, 1, json!(1));
        observe(&mut profile, 2, json!("y"));
        profile.observe_absent(1);

        let tags: Vec<TypeTag> = profile.observations().iter().map(|o| o.tag).collect();
        assert_eq!(tags, vec![TypeTag::String, TypeTag::Integer, TypeTag::Null]);
        assert_eq!(profile.count(TypeTag::String), 2);
        assert_eq!(profile.occurrences(), 4);
        assert!(profile.nullable());
        assert!(profile.is_multi_choice());
    }

    #[test]
    fn test_late_column_starts_null() {
        let profile = ColumnProfile::new("late", 3);
        assert_eq!(profile.count(TypeTag::Null), 3);
        assert_eq!(profile.data_type(), TypeTag::Null);
    }

    #[test]
    fn test_fingerprint_tracks_values_and_rows() {
        let mut a = ColumnProfile::new("a", 0);
        let mut b = ColumnProfile::new("b", 0);
        observe(&mut a, 0, json!(1));
        observe(&mut b, 0, json!(1));
        observe(&mut a, 1, json!(null));
        b.observe_absent(1);
        assert_eq!(a.fingerprint(), b.fingerprint());

        observe(&mut a, 2, json!("1"));
        observe(&mut b, 2, json!(1));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_resolve_keeps_null_and_sums_concrete() {
        let mut profile = ColumnProfile::new("a", 2);
        observe(&mut profile, 2, json!(1));
        observe(&mut profile, 3, json!(2.5));
        observe(&mut profile, 4, json!("x"));

        assert!(profile.resolve());
        assert_eq!(
            profile.observations(),
            &[
                TagCount { tag: TypeTag::Null, count: 2 },
                TagCount { tag: TypeTag::String, count: 3 },
            ]
        );
        assert_eq!(profile.coerce_to(), Some(TypeTag::String));
        assert!(!profile.resolve());
    }

    #[test]
    fn test_coerce_only_when_resolved() {
        let mut profile = ColumnProfile::new("a", 0);
        observe(&mut profile, 0, json!(7));
        assert_eq!(profile.coerce(json!(7)), json!(7));

        observe(&mut profile, 1, json!(true));
        profile.resolve();
        assert_eq!(profile.coerce(json!(7)), json!("7"));
        assert_eq!(profile.coerce(json!(true)), json!("true"));
        assert_eq!(profile.coerce(json!(1.25)), json!("1.25"));
        assert_eq!(profile.coerce(json!(null)), json!(null));
        assert_eq!(profile.coerce(json!("s")), json!("s"));
    }

    #[test]
    fn test_unsigned_beyond_bigint_is_text() {
        let mut profile = ColumnProfile::new("big", 0);
        observe(&mut profile, 0, json!(u64::MAX));

        assert_eq!(profile.data_type(), TypeTag::String);
        assert!(!profile.is_multi_choice());
        assert_eq!(profile.coerce(json!(u64::MAX)), json!("18446744073709551615"));
    }
}
