//! Read-through cache of database and collection names.
//!
//! Listing names scans the whole document table, so results are kept until
//! a caller invalidates them or a sync run changes the store.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// What a cached name list enumerates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameKey {
    Databases { store: String },
    Collections { store: String, database: String },
}

/// A cached name list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedNames {
    pub names: Vec<String>,
    pub cached_at: DateTime<Utc>,
}

/// Name cache shared across handlers.
#[derive(Debug, Default)]
pub struct NameCache {
    entries: DashMap<NameKey, CachedNames>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &NameKey) -> Option<CachedNames> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Store a fresh name list and return it.
    pub fn put(&self, key: NameKey, names: Vec<String>) -> CachedNames {
        let cached = CachedNames {
            names,
            cached_at: Utc::now(),
        };
        self.entries.insert(key, cached.clone());
        cached
    }

    /// Drop every entry for one store. Returns how many were dropped.
    pub fn invalidate_store(&self, store: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| match key {
            NameKey::Databases { store: s } | NameKey::Collections { store: s, .. } => s != store,
        });
        before - self.entries.len()
    }

    /// Drop everything. Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
