//! Alternate Key Index Module
//!
//! Secondary lookup: maps alternate keys to the primary key of the entry
//! that owns them, enforcing uniqueness within a cache.

use std::collections::HashMap;

use crate::error::{CacheError, Result};

// == Alternate Key Index ==
/// Alternate-key → primary-key map for one cache.
///
/// Every alternate key is bound to at most one primary key. Rebinding an
/// alternate key to the same primary is idempotent; rebinding it to a
/// different primary is a conflict.
#[derive(Debug)]
pub(crate) struct AltKeyIndex {
    /// The owning cache's value-type, used in conflict errors
    value_type: String,
    /// Alternate key → primary key
    alt_to_primary: HashMap<String, String>,
}

impl AltKeyIndex {
    // == Constructor ==
    pub fn new(value_type: impl Into<String>) -> Self {
        Self {
            value_type: value_type.into(),
            alt_to_primary: HashMap::new(),
        }
    }

    // == Lookup ==
    /// Returns the primary key an alternate key is bound to, if any.
    pub fn primary_for(&self, alt_key: &str) -> Option<&str> {
        self.alt_to_primary.get(alt_key).map(String::as_str)
    }

    // == Check ==
    /// Verifies that binding `alt_key` to `primary` would not conflict,
    /// without binding it.
    pub fn check(&self, alt_key: &str, primary: &str) -> Result<()> {
        match self.alt_to_primary.get(alt_key) {
            Some(existing) if existing != primary => Err(CacheError::AlternateKeyConflict {
                alt_key: alt_key.to_string(),
                key: primary.to_string(),
                value_type: self.value_type.clone(),
                existing_key: existing.clone(),
            }),
            _ => Ok(()),
        }
    }

    // == Bind ==
    /// Binds an alternate key to a primary key.
    ///
    /// Idempotent when already bound to the same primary; fails with
    /// `AlternateKeyConflict` when bound to a different one.
    pub fn bind(&mut self, alt_key: &str, primary: &str) -> Result<()> {
        self.check(alt_key, primary)?;
        self.alt_to_primary
            .insert(alt_key.to_string(), primary.to_string());
        Ok(())
    }

    // == Unbind ==
    /// Drops a single alternate-key binding.
    #[allow(dead_code)]
    pub fn unbind(&mut self, alt_key: &str) {
        self.alt_to_primary.remove(alt_key);
    }

    /// Drops every binding in the given set.
    pub fn unbind_all<'a>(&mut self, alt_keys: impl IntoIterator<Item = &'a String>) {
        for alt_key in alt_keys {
            self.alt_to_primary.remove(alt_key);
        }
    }

    // == Clear ==
    /// Drops all bindings.
    pub fn clear(&mut self) {
        self.alt_to_primary.clear();
    }

    /// Number of live bindings.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.alt_to_primary.len()
    }
}
