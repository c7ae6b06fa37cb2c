//! Property-Based Tests for the Cache Module
//!
//! Uses proptest to drive random operation sequences against a cache and a
//! simple reference model, checking the structural invariants: the size
//! bound, alternate-key resolution, strict oldest→newest ordering, and
//! monotonic event order.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::Value;

use crate::cache::{Cache, CacheEntry, EntryGetter};
use crate::config::RegistryConfig;
use crate::error::CacheError;
use crate::events::bus::EventBus;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 4;

fn test_cache(max_entries: usize) -> Cache {
    let config = RegistryConfig {
        default_max_entries: max_entries,
        ..RegistryConfig::default()
    };
    Cache::new("Prop", &config, Arc::new(EventBus::new()))
}

// == Strategies ==
/// Small key space so updates, conflicts, and evictions happen often
fn key_strategy() -> impl Strategy<Value = String> {
    "k[0-9]"
}

fn alt_keys_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("a[0-9]", 0..3)
}

fn value_strategy() -> impl Strategy<Value = Value> {
    "[a-z]{1,8}".prop_map(Value::String)
}

/// One step of a random cache workload
#[derive(Debug, Clone)]
enum CacheOp {
    Set {
        key: String,
        value: Value,
        alt_keys: BTreeSet<String>,
    },
    Get {
        key: String,
    },
    Delete {
        key: String,
    },
    Clear,
    SetMaxSize {
        max_size: usize,
    },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        5 => (key_strategy(), value_strategy(), alt_keys_strategy())
            .prop_map(|(key, value, alt_keys)| CacheOp::Set { key, value, alt_keys }),
        3 => prop_oneof!["k[0-9]", "a[0-9]"].prop_map(|key| CacheOp::Get { key }),
        2 => key_strategy().prop_map(|key| CacheOp::Delete { key }),
        1 => Just(CacheOp::Clear),
        1 => (0usize..6).prop_map(|max_size| CacheOp::SetMaxSize { max_size }),
    ]
}

// == Reference Model ==
/// Straight-line model: entries in oldest→newest order.
#[derive(Debug, Default)]
struct Model {
    /// (key, value, alt_keys), index 0 = oldest
    entries: Vec<(String, Value, BTreeSet<String>)>,
    /// `None` = unbounded
    max_size: Option<usize>,
}

impl Model {
    fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size: if max_size == 0 { None } else { Some(max_size) },
        }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _, _)| k == key)
    }

    fn resolve(&self, key_or_alt: &str) -> Option<usize> {
        self.position(key_or_alt).or_else(|| {
            self.entries
                .iter()
                .position(|(_, _, alts)| alts.contains(key_or_alt))
        })
    }

    /// Mirrors the cache's conflict rules; `true` when the set is legal.
    fn set_allowed(&self, key: &str, alt_keys: &BTreeSet<String>) -> bool {
        alt_keys.iter().all(|alt| {
            let bound_elsewhere = self
                .entries
                .iter()
                .any(|(k, _, alts)| k != key && alts.contains(alt));
            let shadows_primary = alt != key && self.position(alt).is_some();
            !bound_elsewhere && !shadows_primary
        })
    }

    fn set(&mut self, key: &str, value: Value, alt_keys: BTreeSet<String>) {
        if let Some(pos) = self.position(key) {
            let (_, _, mut alts) = self.entries.remove(pos);
            alts.extend(alt_keys);
            self.entries.push((key.to_string(), value, alts));
            return;
        }
        if let Some(cap) = self.max_size {
            if self.entries.len() >= cap {
                self.entries.remove(0);
            }
        }
        self.entries.push((key.to_string(), value, alt_keys));
    }

    fn touch(&mut self, key_or_alt: &str) -> Option<Value> {
        let pos = self.resolve(key_or_alt)?;
        let entry = self.entries.remove(pos);
        let value = entry.1.clone();
        self.entries.push(entry);
        Some(value)
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    fn set_max_size(&mut self, max_size: usize) {
        self.max_size = if max_size == 0 { None } else { Some(max_size) };
        if let Some(cap) = self.max_size {
            while self.entries.len() > cap {
                self.entries.remove(0);
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _, _)| k.clone()).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // For any operation sequence, the cache agrees with the model on size,
    // ordering, membership, and the size bound.
    #[test]
    fn prop_cache_matches_reference_model(
        ops in prop::collection::vec(cache_op_strategy(), 1..40)
    ) {
        let cache = test_cache(TEST_MAX_ENTRIES);
        let mut model = Model::new(TEST_MAX_ENTRIES);

        for op in ops {
            match op {
                CacheOp::Set { key, value, alt_keys } => {
                    let entry = CacheEntry::new(&key, value.clone())
                        .with_alternate_keys(alt_keys.iter().cloned());
                    let outcome = cache.set(entry);
                    if model.set_allowed(&key, &alt_keys) {
                        prop_assert!(outcome.is_ok(), "unexpected error: {outcome:?}");
                        model.set(&key, value, alt_keys);
                    } else {
                        prop_assert!(
                            matches!(outcome, Err(CacheError::AlternateKeyConflict { .. })),
                            "expected conflict, got {outcome:?}"
                        );
                    }
                }
                CacheOp::Get { key } => {
                    let got = cache.get(&key).unwrap();
                    let expected = model.touch(&key);
                    prop_assert_eq!(got, expected);
                }
                CacheOp::Delete { key } => {
                    let removed = cache.delete(&key).unwrap();
                    prop_assert_eq!(removed, model.delete(&key));
                }
                CacheOp::Clear => {
                    cache.clear().unwrap();
                    model.entries.clear();
                }
                CacheOp::SetMaxSize { max_size } => {
                    cache.set_max_size(max_size).unwrap();
                    model.set_max_size(max_size);
                }
            }

            // Size bound and live-entry count
            prop_assert_eq!(cache.size(), model.entries.len());
            if let Some(cap) = model.max_size {
                prop_assert!(cache.size() <= cap);
            }

            // Strict oldest→newest traversal matches the model
            let cache_keys: Vec<String> =
                cache.entries().into_iter().map(|e| e.key).collect();
            prop_assert_eq!(cache_keys, model.keys());

            // Every alternate key of a live entry resolves to its value
            for (key, value, alts) in &model.entries {
                let got = cache.get_without_lru_change(key);
                prop_assert_eq!(
                    got.as_ref(),
                    Some(value)
                );
                for alt in alts {
                    let got_alt = cache.get_without_lru_change(alt);
                    prop_assert_eq!(
                        got_alt.as_ref(),
                        Some(value),
                        "alt key {} of entry {} failed to resolve", alt, key
                    );
                }
            }
        }
    }

    // Re-setting an entry is a pure touch: same size, same final ordering
    // as a single set.
    #[test]
    fn prop_reset_is_idempotent(
        key in key_strategy(),
        value in value_strategy(),
        alt_keys in alt_keys_strategy(),
    ) {
        let once = test_cache(TEST_MAX_ENTRIES);
        let twice = test_cache(TEST_MAX_ENTRIES);
        let entry = CacheEntry::new(&key, value).with_alternate_keys(alt_keys);

        once.set(entry.clone()).unwrap();
        twice.set(entry.clone()).unwrap();
        twice.set(entry).unwrap();

        prop_assert_eq!(once.size(), twice.size());
        prop_assert_eq!(once.entries(), twice.entries());
    }

    // Within one batch, recorded event orders are 0..n and strictly
    // monotonic in call sequence.
    #[test]
    fn prop_event_order_is_monotonic(
        values in prop::collection::vec(value_strategy(), 1..10)
    ) {
        let bus = Arc::new(EventBus::new());
        let config = RegistryConfig::default();
        let cache = Cache::new("Prop", &config, Arc::clone(&bus));

        let orders = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&orders);
        bus.register(
            Arc::new(move |record| {
                let changes = record.changes_for("Prop").unwrap();
                sink.lock()
                    .extend(changes.inserts.iter().map(|item| item.order));
                Ok(())
            }),
            None,
        );

        let entries: Vec<CacheEntry> = values
            .iter()
            .enumerate()
            .map(|(i, v)| CacheEntry::new(format!("k{i}"), v.clone()))
            .collect();
        let count = entries.len() as u64;
        cache.set_all(entries).unwrap();

        let orders = orders.lock();
        let expected: Vec<u64> = (0..count).collect();
        prop_assert_eq!(&*orders, &expected);
    }

    // A getter-populated entry behaves like a normal resident afterwards.
    #[test]
    fn prop_getter_population_round_trips(key in "k[0-9]{1,3}") {
        let cache = test_cache(TEST_MAX_ENTRIES);
        cache.set_entry_getter(Some(EntryGetter::from_fn(|key| {
            Some(
                CacheEntry::new(key, Value::String(format!("{key}_v")))
                    .with_alternate_keys([format!("{key}_a")]),
            )
        })));

        let fetched = cache.get(&key).unwrap();
        prop_assert_eq!(fetched, Some(Value::String(format!("{key}_v"))));
        prop_assert_eq!(
            cache.get(&format!("{key}_a")).unwrap(),
            Some(Value::String(format!("{key}_v")))
        );
        prop_assert_eq!(cache.size(), 1);
    }
}
