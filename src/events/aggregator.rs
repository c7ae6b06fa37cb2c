//! Change Aggregator Module
//!
//! Folds a burst of cache mutations into exactly one change record per
//! transaction. Transactions nest by depth counting: the accumulator opens
//! when depth goes 0→1 and is taken when it returns to 0.

use crate::cache::CacheEntry;
use crate::events::record::{ChangeItem, ChangeKind, ChangeRecord};

// == Change Aggregator ==
/// Accumulates pending changes while a transaction is open.
#[derive(Debug, Default)]
pub(crate) struct ChangeAggregator {
    /// Accumulator for the currently open transaction
    accumulator: Option<ChangeRecord>,
    /// Next order index; one counter spans all value-types and kinds
    next_order: u64,
    /// Nesting depth of open transactions
    depth: usize,
}

impl ChangeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    // == Begin ==
    /// Opens a transaction. The outermost begin gets a fresh accumulator
    /// and a zeroed order counter; nested begins join it.
    pub fn begin(&mut self) {
        if self.depth == 0 {
            self.accumulator = Some(ChangeRecord::new());
            self.next_order = 0;
        }
        self.depth += 1;
    }

    // == Record ==
    /// Appends a snapshot of `entry` with the next order value.
    ///
    /// All mutations run inside a transaction, so the accumulator is always
    /// open here; a record arriving outside one is dropped.
    pub fn record(&mut self, value_type: &str, kind: ChangeKind, entry: &CacheEntry) {
        debug_assert!(self.depth > 0, "change recorded outside a transaction");
        if let Some(record) = self.accumulator.as_mut() {
            let order = self.next_order;
            self.next_order += 1;
            record.push(value_type, kind, ChangeItem::snapshot(entry, order));
        }
    }

    // == End ==
    /// Closes a transaction. Returns the accumulated record when the last
    /// nested transaction closes and anything was recorded; the caller
    /// dispatches it after releasing its locks.
    pub fn end(&mut self) -> Option<ChangeRecord> {
        debug_assert!(self.depth > 0, "transaction closed more often than opened");
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return None;
        }
        self.next_order = 0;
        self.accumulator.take().filter(|record| !record.is_empty())
    }

    /// Whether a transaction is currently open.
    #[cfg(test)]
    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }
}
