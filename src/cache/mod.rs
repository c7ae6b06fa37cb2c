//! Cache Module
//!
//! Per-value-type caching with LRU eviction and alternate-key lookup.

mod alt_key;
mod entry;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

pub(crate) use alt_key::AltKeyIndex;
pub(crate) use lru::LruMap;

// Re-export public types
pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::{AsyncGetterFn, Cache, EntryGetter, GetOptions, SyncGetterFn};

// == Public Constants ==
/// Maximum allowed length for primary and alternate keys, in bytes
pub const MAX_KEY_LENGTH: usize = 256;
