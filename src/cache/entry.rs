//! Cache Entry Module
//!
//! Defines the stored unit: a primary key, an arbitrary JSON payload, and
//! zero or more alternate lookup keys.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// A single cache entry.
///
/// Identity is the primary `key`, unique within a cache. `alternate_keys`
/// are secondary lookup identifiers, unique across the whole cache; on
/// update they extend with union semantics (an update never drops an
/// alternate key that was previously bound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Primary identifier, unique within a cache
    pub key: String,
    /// The stored payload
    pub value: Value,
    /// Secondary lookup identifiers, possibly empty
    #[serde(default)]
    pub alternate_keys: BTreeSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry with no alternate keys.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            alternate_keys: BTreeSet::new(),
        }
    }

    // == Alternate Keys ==
    /// Adds alternate keys, builder-style.
    pub fn with_alternate_keys<I, S>(mut self, alternate_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_keys
            .extend(alternate_keys.into_iter().map(Into::into));
        self
    }

    /// Unions the alternate keys of a previous revision of this entry into
    /// this one. Used on update so re-setting an entry never sheds aliases.
    pub(crate) fn absorb_alternate_keys(&mut self, previous: &BTreeSet<String>) {
        self.alternate_keys
            .extend(previous.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_new_has_no_alternate_keys() {
        let entry = CacheEntry::new("k1", json!("v1"));
        assert_eq!(entry.key, "k1");
        assert_eq!(entry.value, json!("v1"));
        assert!(entry.alternate_keys.is_empty());
    }

    #[test]
    fn test_with_alternate_keys_collects_and_dedups() {
        let entry = CacheEntry::new("k1", json!(1)).with_alternate_keys(["a1", "a2", "a1"]);
        assert_eq!(entry.alternate_keys.len(), 2);
        assert!(entry.alternate_keys.contains("a1"));
        assert!(entry.alternate_keys.contains("a2"));
    }

    #[test]
    fn test_absorb_alternate_keys_is_a_union() {
        let mut entry = CacheEntry::new("k1", json!(1)).with_alternate_keys(["a2"]);
        let previous: BTreeSet<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();

        entry.absorb_alternate_keys(&previous);

        assert_eq!(entry.alternate_keys.len(), 2);
        assert!(entry.alternate_keys.contains("a1"));
        assert!(entry.alternate_keys.contains("a2"));
    }
}
