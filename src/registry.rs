//! Cache Registry Module
//!
//! The per-value-type cache registry and its transaction entry points.
//! A registry owns one cache per value-type, created lazily, and one event
//! bus shared by all of them, so a transaction spanning several caches
//! still dispatches a single change record.
//!
//! A process-wide default registry backs the free functions at the bottom
//! of this module; independent registries can be constructed for isolation
//! (tests, embedding several cache universes in one process).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::cache::Cache;
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::events::bus::EventBus;
use crate::events::{ChangedHandler, HandlerHandle};

// == Cache Registry ==
/// Owns the caches of one cache universe.
///
/// Repeated retrieval by the same value-type returns the same cache;
/// caches live for the registry's lifetime.
#[derive(Debug)]
pub struct CacheRegistry {
    caches: RwLock<HashMap<String, Cache>>,
    bus: Arc<EventBus>,
    config: RegistryConfig,
}

impl CacheRegistry {
    // == Constructor ==
    /// Creates a registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates a registry applying `config` to the caches it creates.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            bus: Arc::new(EventBus::new()),
            config,
        }
    }

    // == Cache Access ==
    /// Returns the cache for a value-type, creating it on first retrieval.
    pub fn get_cache(&self, value_type: &str) -> Cache {
        if let Some(cache) = self.caches.read().get(value_type) {
            return cache.clone();
        }
        let mut caches = self.caches.write();
        caches
            .entry(value_type.to_string())
            .or_insert_with(|| {
                debug!(value_type, "creating cache");
                Cache::new(value_type, &self.config, Arc::clone(&self.bus))
            })
            .clone()
    }

    /// Clears every cache in the registry under a single transaction.
    pub fn clear_all_caches(&self) -> Result<()> {
        let txn = self.bus.begin();
        let caches: Vec<Cache> = self.caches.read().values().cloned().collect();
        for cache in caches {
            cache.clear()?;
        }
        txn.commit()
    }

    // == Transactions ==
    /// Runs `work` inside a transaction: every mutation it performs lands
    /// in one change record, dispatched when the outermost transaction
    /// closes. Nested calls join the outer transaction.
    pub fn transaction<R>(&self, work: impl FnOnce() -> R) -> Result<R> {
        let txn = self.bus.begin();
        let out = work();
        txn.commit()?;
        Ok(out)
    }

    /// Like `transaction`, for awaitable work: the transaction stays open
    /// until the future settles.
    pub async fn transaction_async<F>(&self, work: F) -> Result<F::Output>
    where
        F: Future,
    {
        let txn = self.bus.begin();
        let out = work.await;
        txn.commit()?;
        Ok(out)
    }

    // == Listeners ==
    /// Registers a change handler.
    ///
    /// `value_types` filters which caches the handler observes: `None`
    /// means all, a list means exactly those (an empty list matches
    /// nothing). Handlers stay registered until the returned handle's
    /// `unregister` is called.
    pub fn register_cache_changed_handler(
        &self,
        handler: ChangedHandler,
        value_types: Option<Vec<String>>,
    ) -> HandlerHandle {
        let id = self.bus.register(handler, value_types);
        HandlerHandle::new(id, Arc::clone(&self.bus))
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// == Default Registry ==

static DEFAULT_REGISTRY: Lazy<CacheRegistry> =
    Lazy::new(|| CacheRegistry::with_config(RegistryConfig::from_env()));

/// The process-wide default registry backing the free functions.
pub fn default_registry() -> &'static CacheRegistry {
    &DEFAULT_REGISTRY
}

/// Returns the default registry's cache for a value-type.
pub fn get_cache(value_type: &str) -> Cache {
    DEFAULT_REGISTRY.get_cache(value_type)
}

/// Clears every cache of the default registry under one transaction.
pub fn clear_all_caches() -> Result<()> {
    DEFAULT_REGISTRY.clear_all_caches()
}

/// Runs `work` inside a transaction on the default registry.
pub fn cache_transaction<R>(work: impl FnOnce() -> R) -> Result<R> {
    DEFAULT_REGISTRY.transaction(work)
}

/// Runs awaitable `work` inside a transaction on the default registry.
pub async fn cache_transaction_async<F>(work: F) -> Result<F::Output>
where
    F: Future,
{
    DEFAULT_REGISTRY.transaction_async(work).await
}

/// Registers a change handler on the default registry.
pub fn register_cache_changed_handler(
    handler: ChangedHandler,
    value_types: Option<Vec<String>>,
) -> HandlerHandle {
    DEFAULT_REGISTRY.register_cache_changed_handler(handler, value_types)
}
