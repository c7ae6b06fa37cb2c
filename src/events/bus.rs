//! Event Bus Module
//!
//! Binds the change aggregator to the listener registry and owns the
//! dispatch path. All caches of one registry share a single bus, so a
//! transaction spanning several caches still produces one record.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};
use crate::events::aggregator::ChangeAggregator;
use crate::events::listeners::{ChangedHandler, ListenerRegistry};
use crate::events::record::{ChangeKind, ChangeRecord};

// == Event Bus ==
/// Shared aggregator + listener registry.
///
/// Lock discipline: callers may hold a cache-state lock while calling
/// `record`, but `dispatch` always runs with no locks held so handlers can
/// re-enter the cache API.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    aggregator: Mutex<ChangeAggregator>,
    listeners: RwLock<ListenerRegistry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            aggregator: Mutex::new(ChangeAggregator::new()),
            listeners: RwLock::new(ListenerRegistry::new()),
        }
    }

    // == Transactions ==
    /// Opens a (possibly nested) transaction and returns its guard.
    pub fn begin(self: &Arc<Self>) -> Transaction {
        self.aggregator.lock().begin();
        Transaction {
            bus: Arc::clone(self),
            committed: false,
        }
    }

    /// Records one change inside the open transaction.
    pub fn record(&self, value_type: &str, kind: ChangeKind, entry: &CacheEntry) {
        self.aggregator.lock().record(value_type, kind, entry);
    }

    /// Closes one transaction level; dispatches when the outermost closed.
    fn close_and_dispatch(&self) -> Result<()> {
        let record = self.aggregator.lock().end();
        match record {
            Some(record) => self.dispatch(&record),
            None => Ok(()),
        }
    }

    // == Dispatch ==
    /// Invokes every interested active handler, in registration order.
    ///
    /// All handlers run even when earlier ones fail; failures are
    /// aggregated into a single `HandlerFailures` error afterwards.
    fn dispatch(&self, record: &ChangeRecord) -> Result<()> {
        let value_types: Vec<&str> = record.value_types().collect();
        let handlers = self.listeners.read().active_handlers_for(&value_types);
        let invoked = handlers.len();
        debug!(
            value_types = ?value_types,
            changes = record.len(),
            handlers = invoked,
            "dispatching change record"
        );

        let mut messages = Vec::new();
        for (id, handler) in handlers {
            if let Err(err) = handler(record) {
                messages.push(format!("handler {id}: {err}"));
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(CacheError::HandlerFailures {
                failed: messages.len(),
                invoked,
                messages,
            })
        }
    }

    // == Listener management ==

    pub fn register(&self, handler: ChangedHandler, value_types: Option<Vec<String>>) -> u64 {
        self.listeners.write().register(handler, value_types)
    }

    pub fn unregister(&self, id: u64) -> bool {
        self.listeners.write().unregister(id)
    }

    pub fn activate(&self, id: u64) -> bool {
        self.listeners.write().activate(id)
    }

    pub fn deactivate(&self, id: u64) -> bool {
        self.listeners.write().deactivate(id)
    }

    pub fn is_registered(&self, id: u64) -> bool {
        self.listeners.read().is_registered(id)
    }

    /// Whether any active handler would observe `value_type`. Caches use
    /// this to skip event bookkeeping entirely when nobody listens.
    pub fn has_active_handler_for(&self, value_type: &str) -> bool {
        self.listeners.read().has_active_handler_for(value_type)
    }
}

// == Transaction Guard ==
/// RAII guard for one transaction level.
///
/// `commit` closes the level and surfaces dispatch errors. A guard dropped
/// without commit (early return, panic) still closes its level so the
/// aggregator never leaks an open transaction; dispatch errors on that
/// path can only be logged.
#[must_use = "dropping a transaction without commit loses dispatch errors"]
pub(crate) struct Transaction {
    bus: Arc<EventBus>,
    committed: bool,
}

impl Transaction {
    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.bus.close_and_dispatch()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(err) = self.bus.close_and_dispatch() {
                warn!(error = %err, "change dispatch failed while unwinding a transaction");
            }
        }
    }
}
