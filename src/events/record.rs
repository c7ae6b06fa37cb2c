//! Change Record Module
//!
//! The structured record handed to listeners after a transaction closes:
//! for every touched value-type, the inserts, clear removals, LRU removals,
//! and delete removals that happened, each stamped with a transaction-wide
//! order index.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheEntry;

// == Change Kind ==
/// The four kinds of recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entry was inserted or updated
    Insert,
    /// Entry was removed by `clear`
    ClearRemove,
    /// Entry was evicted by the LRU policy
    LruRemove,
    /// Entry was removed by `delete`
    DeleteRemove,
}

// == Change Item ==
/// Snapshot of one changed entry.
///
/// `value` and `alternate_keys` are captured at the moment of change;
/// later mutations of the live entry do not alter recorded items.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeItem {
    /// Primary key of the changed entry
    pub key: String,
    /// Payload at the moment of change
    pub value: Value,
    /// Alternate keys at the moment of change
    pub alternate_keys: BTreeSet<String>,
    /// Transaction-wide order index, strictly monotonic across all
    /// value-types and change kinds
    pub order: u64,
}

impl ChangeItem {
    pub(crate) fn snapshot(entry: &CacheEntry, order: u64) -> Self {
        Self {
            key: entry.key.clone(),
            value: entry.value.clone(),
            alternate_keys: entry.alternate_keys.clone(),
            order,
        }
    }
}

// == Type Changes ==
/// All changes recorded for one value-type within a transaction.
///
/// All four lists exist for every touched value-type, empty or not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeChanges {
    /// Inserts and updates
    pub inserts: Vec<ChangeItem>,
    /// Removals caused by `clear`
    pub clear_removes: Vec<ChangeItem>,
    /// LRU evictions
    pub lru_removes: Vec<ChangeItem>,
    /// Removals caused by `delete`
    pub delete_removes: Vec<ChangeItem>,
}

impl TypeChanges {
    fn list_mut(&mut self, kind: ChangeKind) -> &mut Vec<ChangeItem> {
        match kind {
            ChangeKind::Insert => &mut self.inserts,
            ChangeKind::ClearRemove => &mut self.clear_removes,
            ChangeKind::LruRemove => &mut self.lru_removes,
            ChangeKind::DeleteRemove => &mut self.delete_removes,
        }
    }

    /// Total number of items across the four lists.
    pub fn len(&self) -> usize {
        self.inserts.len()
            + self.clear_removes.len()
            + self.lru_removes.len()
            + self.delete_removes.len()
    }

    /// Whether no change was recorded for this value-type.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == Change Record ==
/// Everything that changed within one transaction, keyed by value-type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeRecord {
    changes: std::collections::BTreeMap<String, TypeChanges>,
}

impl ChangeRecord {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, value_type: &str, kind: ChangeKind, item: ChangeItem) {
        self.changes
            .entry(value_type.to_string())
            .or_default()
            .list_mut(kind)
            .push(item);
    }

    /// The value-types touched by this transaction.
    pub fn value_types(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    /// Changes recorded for one value-type, if it was touched.
    pub fn changes_for(&self, value_type: &str) -> Option<&TypeChanges> {
        self.changes.get(value_type)
    }

    /// Iterates `(value_type, changes)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeChanges)> {
        self.changes.iter().map(|(vt, c)| (vt.as_str(), c))
    }

    /// Total number of recorded items across all value-types.
    pub fn len(&self) -> usize {
        self.changes.values().map(TypeChanges::len).sum()
    }

    /// Whether the transaction recorded nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
