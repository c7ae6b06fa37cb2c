//! cachebus - in-process, per-value-type caches with change notifications
//!
//! Each cache maps primary keys to JSON payloads, supports alternate
//! lookup keys, evicts least-recently-used entries past a configurable
//! cap, and reports every mutation to registered listeners as a single
//! ordered change record per transaction.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;

pub use cache::{Cache, CacheEntry, CacheStats, EntryGetter, GetOptions, MAX_KEY_LENGTH};
pub use config::RegistryConfig;
pub use error::{BoxError, CacheError, Result};
pub use events::{ChangeItem, ChangeKind, ChangeRecord, ChangedHandler, HandlerHandle, TypeChanges};
pub use registry::{
    cache_transaction, cache_transaction_async, clear_all_caches, default_registry, get_cache,
    register_cache_changed_handler, CacheRegistry,
};
