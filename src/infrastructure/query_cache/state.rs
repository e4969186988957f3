//! Entry table and similarity index guarded together

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::similarity_index::SimilarityIndex;
use crate::domain::query_cache::{CacheEntry, CompositeKey};

/// Everything behind the cache's single read/write lock
///
/// Insertion and removal always update the table, the index and the memory
/// estimate together, so holding `&mut CacheState` is enough to keep them
/// consistent.
#[derive(Debug, Default)]
pub struct CacheState {
    entries: HashMap<CompositeKey, CacheEntry>,
    index: SimilarityIndex,
    memory_bytes: u64,
}

impl CacheState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn get(&self, key: &CompositeKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &CompositeKey) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let replaced = self.remove(entry.key());

        if let Some(embedding) = entry.embedding() {
            self.index
                .insert(entry.key().clone(), entry.scope().clone(), embedding.to_vec());
        }

        self.memory_bytes += entry.memory_footprint();
        self.entries.insert(entry.key().clone(), entry);

        replaced
    }

    /// Remove an entry from the table and the index
    pub fn remove(&mut self, key: &CompositeKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;

        self.index.remove(key);
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.memory_footprint());

        Some(entry)
    }

    /// Remove every entry matching `predicate`
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<CacheEntry>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let keys: Vec<CompositeKey> = self
            .entries
            .values()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Remove every entry older than `ttl` at `now`
    pub fn remove_expired(&mut self, ttl: Duration, now: DateTime<Utc>) -> Vec<CacheEntry> {
        self.remove_where(|entry| entry.is_expired_at(ttl, now))
    }

    /// Remove everything
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        self.index.clear();
        self.memory_bytes = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}
