//! Cache Store Module
//!
//! The per-value-type cache facade: validation, transactional mutation,
//! LRU ordering, alternate-key bookkeeping, change recording, and
//! miss-population through an optional entry getter.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::cache::{AltKeyIndex, CacheEntry, CacheStats, LruMap, MAX_KEY_LENGTH};
use crate::config::RegistryConfig;
use crate::error::{CacheError, Result};
use crate::events::bus::EventBus;
use crate::events::ChangeKind;

/// Synchronous entry getter: key (or alternate key) → entry to insert.
pub type SyncGetterFn = Arc<dyn Fn(&str) -> Option<CacheEntry> + Send + Sync>;

/// Asynchronous entry getter.
pub type AsyncGetterFn = Arc<dyn Fn(String) -> BoxFuture<'static, Option<CacheEntry>> + Send + Sync>;

/// In-flight async fetch, shared by all concurrent callers of one key.
type SharedFetch = Shared<BoxFuture<'static, Result<Option<Value>>>>;

// == Entry Getter ==
/// Caller-supplied function invoked on cache miss to produce an entry.
///
/// The synchronous variant is consulted by both the sync and async read
/// paths; the asynchronous variant only by `get_async` / `get_async_with`.
#[derive(Clone)]
pub enum EntryGetter {
    /// Produces the entry inline
    Sync(SyncGetterFn),
    /// Produces the entry through a future
    Async(AsyncGetterFn),
}

impl EntryGetter {
    /// Wraps a plain function as a synchronous getter.
    pub fn from_fn(f: impl Fn(&str) -> Option<CacheEntry> + Send + Sync + 'static) -> Self {
        EntryGetter::Sync(Arc::new(f))
    }

    /// Wraps an async function as an asynchronous getter.
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<CacheEntry>> + Send + 'static,
    {
        EntryGetter::Async(Arc::new(move |key| f(key).boxed()))
    }
}

impl fmt::Debug for EntryGetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryGetter::Sync(_) => f.write_str("EntryGetter::Sync"),
            EntryGetter::Async(_) => f.write_str("EntryGetter::Async"),
        }
    }
}

// == Get Options ==
/// Options for `get_with` / `get_async_with`.
#[derive(Debug, Default, Clone)]
pub struct GetOptions {
    /// Skip the cache read and force the getter; fails with `NoEntryGetter`
    /// when no usable getter is available
    pub not_from_cache: bool,
    /// Getter taking precedence over the cache-level one for this call
    pub custom_getter: Option<EntryGetter>,
}

// == Cache ==
/// A per-value-type cache handle.
///
/// Handles are cheap clones over shared state; every clone observes the
/// same entries. Instances are obtained from a
/// [`CacheRegistry`](crate::registry::CacheRegistry) (or the free
/// [`get_cache`](crate::registry::get_cache)), which guarantees one cache
/// per value-type.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<CacheShared>,
}

struct CacheShared {
    value_type: String,
    state: Mutex<CacheState>,
    /// In-flight async fetches, keyed by the requested key
    pending: Mutex<HashMap<String, SharedFetch>>,
    bus: Arc<EventBus>,
}

struct CacheState {
    lru: LruMap,
    alt_keys: AltKeyIndex,
    entry_getter: Option<EntryGetter>,
    dispatch_lru_removes: bool,
    dispatch_clear_removes: bool,
    stats: CacheStats,
}

impl CacheState {
    /// Resolves a primary or alternate key to the primary key, if present.
    fn resolve(&self, key_or_alt: &str) -> Option<String> {
        if self.lru.contains_key(key_or_alt) {
            Some(key_or_alt.to_string())
        } else {
            self.alt_keys.primary_for(key_or_alt).map(str::to_string)
        }
    }
}

impl Cache {
    // == Constructor ==
    pub(crate) fn new(value_type: &str, config: &RegistryConfig, bus: Arc<EventBus>) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                value_type: value_type.to_string(),
                state: Mutex::new(CacheState {
                    lru: LruMap::new(config.default_max_entries),
                    alt_keys: AltKeyIndex::new(value_type),
                    entry_getter: None,
                    dispatch_lru_removes: config.dispatch_lru_removes,
                    dispatch_clear_removes: config.dispatch_clear_removes,
                    stats: CacheStats::new(),
                }),
                pending: Mutex::new(HashMap::new()),
                bus: Arc::clone(&bus),
            }),
        }
    }

    // == Set ==
    /// Inserts or updates a single entry. Equivalent to `set_all` with one
    /// element.
    pub fn set(&self, entry: CacheEntry) -> Result<()> {
        self.set_all(vec![entry])
    }

    /// Inserts or updates a batch of entries under one transaction.
    ///
    /// Per entry: the key is validated, every alternate key is checked for
    /// conflicts (against other entries' alternate keys and primary keys),
    /// alternate keys union with those of any existing revision, the entry
    /// becomes newest, and an insert is recorded. An entry evicted by the
    /// cap has its alternate keys unbound and, when enabled, is recorded
    /// as an LRU removal.
    ///
    /// A mid-batch error aborts the rest of the batch; entries already
    /// processed remain applied and listeners still observe them.
    pub fn set_all(&self, entries: Vec<CacheEntry>) -> Result<()> {
        let txn = self.shared.bus.begin();
        let applied = self.apply_entries(entries);
        let dispatched = txn.commit();
        applied.and(dispatched)
    }

    /// Like `set`, deferred by one scheduler turn.
    pub async fn set_async(&self, entry: CacheEntry) -> Result<()> {
        tokio::task::yield_now().await;
        self.set(entry)
    }

    /// Like `set_all`, deferred by one scheduler turn.
    pub async fn set_all_async(&self, entries: Vec<CacheEntry>) -> Result<()> {
        tokio::task::yield_now().await;
        self.set_all(entries)
    }

    fn apply_entries(&self, entries: Vec<CacheEntry>) -> Result<()> {
        let mut state = self.shared.state.lock();
        let interested = self.shared.bus.has_active_handler_for(&self.shared.value_type);

        for mut entry in entries {
            validate_entry(&entry)?;

            for alt_key in &entry.alternate_keys {
                state.alt_keys.check(alt_key, &entry.key)?;
                // An alternate key may not shadow another entry's primary key
                if alt_key != &entry.key && state.lru.contains_key(alt_key) {
                    return Err(CacheError::AlternateKeyConflict {
                        alt_key: alt_key.clone(),
                        key: entry.key.clone(),
                        value_type: self.shared.value_type.clone(),
                        existing_key: alt_key.clone(),
                    });
                }
            }

            if let Some(existing) = state.lru.peek(&entry.key) {
                let previous = existing.alternate_keys.clone();
                entry.absorb_alternate_keys(&previous);
            }

            let alt_keys: Vec<String> = entry.alternate_keys.iter().cloned().collect();
            for alt_key in &alt_keys {
                state.alt_keys.bind(alt_key, &entry.key)?;
            }

            let snapshot = interested.then(|| entry.clone());
            let evicted = state.lru.set(entry);

            if let Some(snapshot) = snapshot {
                self.shared
                    .bus
                    .record(&self.shared.value_type, ChangeKind::Insert, &snapshot);
            }

            if let Some(evicted_entry) = evicted {
                state.alt_keys.unbind_all(&evicted_entry.alternate_keys);
                state.stats.record_eviction();
                debug!(
                    value_type = %self.shared.value_type,
                    key = %evicted_entry.key,
                    "evicted least recently used entry"
                );
                if interested && state.dispatch_lru_removes {
                    self.shared.bus.record(
                        &self.shared.value_type,
                        ChangeKind::LruRemove,
                        &evicted_entry,
                    );
                }
            }
        }
        Ok(())
    }

    // == Get ==
    /// Looks up a value by primary or alternate key, promoting the entry
    /// to newest. On miss, a configured synchronous entry getter is
    /// invoked and its entry inserted (listeners observe the insert).
    pub fn get(&self, key_or_alt: &str) -> Result<Option<Value>> {
        self.get_with(key_or_alt, GetOptions::default())
    }

    /// `get` with options: `not_from_cache` forces the getter; a custom
    /// getter takes precedence over the cache-level one.
    ///
    /// The synchronous surface never consults an asynchronous getter; use
    /// `get_async_with` for those.
    pub fn get_with(&self, key_or_alt: &str, opts: GetOptions) -> Result<Option<Value>> {
        if !opts.not_from_cache {
            if let Some(value) = self.lookup_touch(key_or_alt) {
                return Ok(Some(value));
            }
        }
        match self.select_getter(opts.custom_getter) {
            Some(EntryGetter::Sync(fetch)) => self.populate_from(fetch(key_or_alt)),
            Some(EntryGetter::Async(_)) | None => {
                if opts.not_from_cache {
                    Err(self.no_entry_getter())
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Async lookup supporting both getter kinds.
    ///
    /// A miss with an asynchronous getter stores a shared in-flight fetch
    /// under the requested key: concurrent calls for the same missing key
    /// await the same future and the getter runs once. On resolution the
    /// produced entry is inserted through the normal `set` path and the
    /// memo is cleared; resolving to `None` clears the memo without
    /// inserting, so a later call retries.
    pub async fn get_async(&self, key_or_alt: &str) -> Result<Option<Value>> {
        self.get_async_with(key_or_alt, GetOptions::default()).await
    }

    /// `get_async` with options; see `get_with`.
    pub async fn get_async_with(&self, key_or_alt: &str, opts: GetOptions) -> Result<Option<Value>> {
        if !opts.not_from_cache {
            if let Some(value) = self.lookup_touch(key_or_alt) {
                return Ok(Some(value));
            }
        }
        match self.select_getter(opts.custom_getter) {
            Some(EntryGetter::Sync(fetch)) => self.populate_from(fetch(key_or_alt)),
            Some(EntryGetter::Async(fetch)) => self.fetch_shared(key_or_alt, fetch).await,
            None => {
                if opts.not_from_cache {
                    Err(self.no_entry_getter())
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Looks up a value without promoting the entry. Pure read: no getter,
    /// no statistics.
    pub fn get_without_lru_change(&self, key_or_alt: &str) -> Option<Value> {
        let state = self.shared.state.lock();
        let primary = state.resolve(key_or_alt)?;
        state.lru.peek(&primary).map(|entry| entry.value.clone())
    }

    /// Whether the key (primary or alternate) is present. Does not consult
    /// the getter and does not touch recency.
    pub fn has(&self, key_or_alt: &str) -> bool {
        let state = self.shared.state.lock();
        state
            .resolve(key_or_alt)
            .is_some_and(|primary| state.lru.contains_key(&primary))
    }

    // == Delete ==
    /// Removes an entry by its primary key.
    ///
    /// Alternate keys are not resolved here: deleting by alias returns
    /// `Ok(false)` and leaves the entry in place. Returns whether the key
    /// was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let txn = self.shared.bus.begin();
        let removed = {
            let mut state = self.shared.state.lock();
            match state.lru.remove(key) {
                Some(entry) => {
                    state.alt_keys.unbind_all(&entry.alternate_keys);
                    if self.shared.bus.has_active_handler_for(&self.shared.value_type) {
                        self.shared.bus.record(
                            &self.shared.value_type,
                            ChangeKind::DeleteRemove,
                            &entry,
                        );
                    }
                    true
                }
                None => false,
            }
        };
        txn.commit()?;
        Ok(removed)
    }

    // == Clear ==
    /// Drops all entries and alternate-key bindings. When clear removals
    /// are enabled, each entry is recorded in oldest→newest order.
    pub fn clear(&self) -> Result<()> {
        let txn = self.shared.bus.begin();
        {
            let mut state = self.shared.state.lock();
            let drained = state.lru.clear();
            state.alt_keys.clear();
            if state.dispatch_clear_removes
                && self.shared.bus.has_active_handler_for(&self.shared.value_type)
            {
                for entry in &drained {
                    self.shared
                        .bus
                        .record(&self.shared.value_type, ChangeKind::ClearRemove, entry);
                }
            }
            debug!(
                value_type = %self.shared.value_type,
                removed = drained.len(),
                "cache cleared"
            );
        }
        txn.commit()
    }

    // == Max Size ==
    /// Changes the entry cap; 0 means unbounded. Shrinking evicts oldest
    /// entries first, unbinding their alternate keys and, when enabled,
    /// recording each as an LRU removal under one transaction.
    pub fn set_max_size(&self, max_size: usize) -> Result<()> {
        let txn = self.shared.bus.begin();
        {
            let mut state = self.shared.state.lock();
            let evicted = state.lru.set_max_size(max_size);
            let interested = state.dispatch_lru_removes
                && self.shared.bus.has_active_handler_for(&self.shared.value_type);
            for entry in &evicted {
                state.alt_keys.unbind_all(&entry.alternate_keys);
                state.stats.record_eviction();
                if interested {
                    self.shared
                        .bus
                        .record(&self.shared.value_type, ChangeKind::LruRemove, entry);
                }
            }
        }
        txn.commit()
    }

    // == Accessors ==
    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.shared.state.lock().lru.len()
    }

    /// Current entry cap; `None` = unbounded.
    pub fn max_size(&self) -> Option<usize> {
        self.shared.state.lock().lru.max_size()
    }

    /// The value-type this cache serves.
    pub fn value_type(&self) -> &str {
        &self.shared.value_type
    }

    /// Snapshot of all entries in oldest→newest order.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.shared.state.lock().lru.map(Clone::clone)
    }

    /// Visits entries oldest→newest. The callback must not call back into
    /// this cache.
    pub fn for_each(&self, f: impl FnMut(&CacheEntry)) {
        self.shared.state.lock().lru.for_each(f);
    }

    /// Performance counters with a current entry count.
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.lru.len());
        stats
    }

    // == Configuration ==
    /// Whether LRU evictions appear in change records.
    pub fn set_dispatch_lru_removes(&self, enabled: bool) {
        self.shared.state.lock().dispatch_lru_removes = enabled;
    }

    /// Whether clear removals appear in change records.
    pub fn set_dispatch_clear_removes(&self, enabled: bool) {
        self.shared.state.lock().dispatch_clear_removes = enabled;
    }

    /// Installs or removes the cache-level entry getter.
    pub fn set_entry_getter(&self, getter: Option<EntryGetter>) {
        self.shared.state.lock().entry_getter = getter;
    }

    // == Internal ==

    /// Cache read that promotes the entry and records hit/miss statistics.
    fn lookup_touch(&self, key_or_alt: &str) -> Option<Value> {
        let mut state = self.shared.state.lock();
        let Some(primary) = state.resolve(key_or_alt) else {
            state.stats.record_miss();
            return None;
        };
        match state.lru.get(&primary).map(|entry| entry.value.clone()) {
            Some(value) => {
                state.stats.record_hit();
                Some(value)
            }
            None => {
                state.stats.record_miss();
                None
            }
        }
    }

    fn select_getter(&self, custom: Option<EntryGetter>) -> Option<EntryGetter> {
        custom.or_else(|| self.shared.state.lock().entry_getter.clone())
    }

    /// Inserts a getter-produced entry through the normal `set` path and
    /// returns its value.
    fn populate_from(&self, produced: Option<CacheEntry>) -> Result<Option<Value>> {
        match produced {
            Some(entry) => {
                let value = entry.value.clone();
                self.set(entry)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Memoized async fetch: one shared in-flight future per requested key.
    async fn fetch_shared(&self, key: &str, fetch: AsyncGetterFn) -> Result<Option<Value>> {
        let shared = {
            let mut pending = self.shared.pending.lock();
            pending
                .entry(key.to_string())
                .or_insert_with(|| {
                    let cache = self.clone();
                    let requested = key.to_string();
                    async move {
                        let produced = fetch(requested.clone()).await;
                        cache.shared.pending.lock().remove(&requested);
                        // A late resolution inserts unconditionally: it
                        // overwrites a newer set and repopulates after clear.
                        cache.populate_from(produced)
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };
        shared.await
    }

    fn no_entry_getter(&self) -> CacheError {
        CacheError::NoEntryGetter {
            value_type: self.shared.value_type.clone(),
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Cache")
            .field("value_type", &self.shared.value_type)
            .field("size", &state.lru.len())
            .field("max_size", &state.lru.max_size())
            .finish()
    }
}

fn validate_entry(entry: &CacheEntry) -> Result<()> {
    validate_key(&entry.key, "entry key")?;
    for alt_key in &entry.alternate_keys {
        validate_key(alt_key, "alternate key")?;
    }
    Ok(())
}

fn validate_key(key: &str, label: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument(format!(
            "{label} must not be empty"
        )));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidArgument(format!(
            "{label} exceeds maximum length of {MAX_KEY_LENGTH} bytes"
        )));
    }
    Ok(())
}
