//! Configuration Module
//!
//! Defaults applied to caches created by a registry, loadable from
//! environment variables.

use std::env;

/// Registry-level cache defaults.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of entries per cache (0 = unbounded)
    pub default_max_entries: usize,
    /// Whether newly created caches report LRU evictions in change records
    pub dispatch_lru_removes: bool,
    /// Whether newly created caches report clear removals in change records
    pub dispatch_clear_removes: bool,
}

impl RegistryConfig {
    /// Creates a new RegistryConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum entries per cache (default: 500)
    /// - `CACHE_DISPATCH_LRU_REMOVES` - Report LRU evictions (default: false)
    /// - `CACHE_DISPATCH_CLEAR_REMOVES` - Report clear removals (default: false)
    pub fn from_env() -> Self {
        Self {
            default_max_entries: env::var("CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_ENTRIES),
            dispatch_lru_removes: env::var("CACHE_DISPATCH_LRU_REMOVES")
                .ok()
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
            dispatch_clear_removes: env::var("CACHE_DISPATCH_CLEAR_REMOVES")
                .ok()
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
        }
    }
}

/// Default per-cache entry cap.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_max_entries: DEFAULT_MAX_ENTRIES,
            dispatch_lru_removes: false,
            dispatch_clear_removes: false,
        }
    }
}
