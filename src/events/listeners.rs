//! Listener Registry Module
//!
//! Subscription management for change handlers: per-value-type filters,
//! activation toggles, and registration-order lookup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::events::bus::EventBus;
use crate::events::record::ChangeRecord;

/// A change handler. Invoked once per dispatched transaction; an `Err`
/// return is collected and aggregated across the dispatch.
pub type ChangedHandler = Arc<dyn Fn(&ChangeRecord) -> Result<(), BoxError> + Send + Sync>;

struct RegisteredHandler {
    handler: ChangedHandler,
    /// `None` = all value-types; an empty list matches nothing
    value_types: Option<Vec<String>>,
    active: bool,
}

// == Listener Registry ==
/// Registered listeners, indexed for fast per-value-type lookup.
///
/// Handler ids ascend in registration order, so iterating the id-keyed
/// `BTreeMap` yields handlers in the order they were registered.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    handlers: BTreeMap<u64, RegisteredHandler>,
    /// Value-type → ids of active handlers filtered to that type
    by_type: HashMap<String, BTreeSet<u64>>,
    /// Ids of active handlers with no filter (match all types)
    all_types: BTreeSet<u64>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Register ==
    /// Registers an active handler and returns its id.
    pub fn register(&mut self, handler: ChangedHandler, value_types: Option<Vec<String>>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.insert(
            id,
            RegisteredHandler {
                handler,
                value_types,
                active: true,
            },
        );
        self.index(id);
        id
    }

    // == Unregister ==
    /// Removes a handler entirely. Returns whether it was registered.
    pub fn unregister(&mut self, id: u64) -> bool {
        if self.handlers.remove(&id).is_none() {
            return false;
        }
        self.unindex(id);
        true
    }

    // == Activation ==
    /// Re-enables a deactivated handler. Returns whether it is registered.
    pub fn activate(&mut self, id: u64) -> bool {
        let Some(registered) = self.handlers.get_mut(&id) else {
            return false;
        };
        if !registered.active {
            registered.active = true;
            self.index(id);
        }
        true
    }

    /// Disables a handler without unregistering it. Returns whether it is
    /// registered.
    pub fn deactivate(&mut self, id: u64) -> bool {
        let Some(registered) = self.handlers.get_mut(&id) else {
            return false;
        };
        if registered.active {
            registered.active = false;
            self.unindex(id);
        }
        true
    }

    /// Whether the id refers to a registered handler (active or not).
    pub fn is_registered(&self, id: u64) -> bool {
        self.handlers.contains_key(&id)
    }

    // == Lookup ==
    /// Active handlers whose filter intersects `value_types`, in
    /// registration order.
    pub fn active_handlers_for(&self, value_types: &[&str]) -> Vec<(u64, ChangedHandler)> {
        let mut ids: BTreeSet<u64> = self.all_types.clone();
        for value_type in value_types {
            if let Some(per_type) = self.by_type.get(*value_type) {
                ids.extend(per_type.iter().copied());
            }
        }
        ids.into_iter()
            .filter_map(|id| {
                self.handlers
                    .get(&id)
                    .map(|registered| (id, Arc::clone(&registered.handler)))
            })
            .collect()
    }

    /// Whether any active handler would observe changes of `value_type`.
    pub fn has_active_handler_for(&self, value_type: &str) -> bool {
        !self.all_types.is_empty()
            || self
                .by_type
                .get(value_type)
                .is_some_and(|ids| !ids.is_empty())
    }

    // == Internal index maintenance ==

    fn index(&mut self, id: u64) {
        let Some(registered) = self.handlers.get(&id) else {
            return;
        };
        match &registered.value_types {
            None => {
                self.all_types.insert(id);
            }
            Some(types) => {
                for value_type in types {
                    self.by_type.entry(value_type.clone()).or_default().insert(id);
                }
            }
        }
    }

    fn unindex(&mut self, id: u64) {
        self.all_types.remove(&id);
        self.by_type.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("handlers", &self.handlers.len())
            .field("all_types", &self.all_types.len())
            .finish()
    }
}

// == Handler Handle ==
/// Handle returned by handler registration.
///
/// The handle stays valid for the process lifetime; listeners must
/// unregister explicitly, the cache never detaches them on its own.
#[derive(Clone)]
pub struct HandlerHandle {
    id: u64,
    bus: Arc<EventBus>,
}

impl HandlerHandle {
    pub(crate) fn new(id: u64, bus: Arc<EventBus>) -> Self {
        Self { id, bus }
    }

    /// Removes the handler. Returns whether it was still registered.
    pub fn unregister(&self) -> bool {
        self.bus.unregister(self.id)
    }

    /// Re-enables a deactivated handler. Returns whether it is registered.
    pub fn activate(&self) -> bool {
        self.bus.activate(self.id)
    }

    /// Disables the handler without unregistering it. Returns whether it
    /// is registered.
    pub fn deactivate(&self) -> bool {
        self.bus.deactivate(self.id)
    }

    /// Whether the handler is still registered (active or not).
    pub fn is_registered(&self) -> bool {
        self.bus.is_registered(self.id)
    }
}

impl fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerHandle").field("id", &self.id).finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ChangedHandler {
        Arc::new(|_| Ok(()))
    }

    #[test]
    fn test_register_and_match_by_type() {
        let mut registry = ListenerRegistry::new();
        let a = registry.register(noop(), Some(vec!["A".to_string()]));
        let b = registry.register(noop(), Some(vec!["B".to_string()]));

        let for_a = registry.active_handlers_for(&["A"]);
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].0, a);

        let for_both = registry.active_handlers_for(&["A", "B"]);
        let ids: Vec<u64> = for_both.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, [a, b]);
    }

    #[test]
    fn test_none_filter_matches_all_types() {
        let mut registry = ListenerRegistry::new();
        let id = registry.register(noop(), None);

        assert_eq!(registry.active_handlers_for(&["Anything"])[0].0, id);
        assert!(registry.has_active_handler_for("Whatever"));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let mut registry = ListenerRegistry::new();
        registry.register(noop(), Some(Vec::new()));

        assert!(registry.active_handlers_for(&["A"]).is_empty());
        assert!(!registry.has_active_handler_for("A"));
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let mut registry = ListenerRegistry::new();
        let first = registry.register(noop(), None);
        let second = registry.register(noop(), Some(vec!["A".to_string()]));
        let third = registry.register(noop(), None);

        let ids: Vec<u64> = registry
            .active_handlers_for(&["A"])
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(ids, [first, second, third]);
    }

    #[test]
    fn test_unregister_removes_from_indices() {
        let mut registry = ListenerRegistry::new();
        let id = registry.register(noop(), Some(vec!["A".to_string()]));

        assert!(registry.unregister(id));
        assert!(!registry.is_registered(id));
        assert!(!registry.has_active_handler_for("A"));
        assert!(!registry.unregister(id));
    }

    #[test]
    fn test_deactivate_and_activate_toggle_matching() {
        let mut registry = ListenerRegistry::new();
        let id = registry.register(noop(), Some(vec!["A".to_string()]));

        assert!(registry.deactivate(id));
        assert!(registry.is_registered(id));
        assert!(registry.active_handlers_for(&["A"]).is_empty());
        assert!(!registry.has_active_handler_for("A"));

        assert!(registry.activate(id));
        assert_eq!(registry.active_handlers_for(&["A"]).len(), 1);
    }

    #[test]
    fn test_toggles_on_unknown_id_report_unregistered() {
        let mut registry = ListenerRegistry::new();
        assert!(!registry.activate(42));
        assert!(!registry.deactivate(42));
        assert!(!registry.is_registered(42));
    }
}
