//! Eviction controller
//!
//! Makes room for an incoming entry in two stages: expired entries are
//! purged first, then victims are chosen by the configured policy until both
//! the entry-count and the memory ceilings hold.

use std::cmp::Reverse;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::state::CacheState;
use crate::domain::query_cache::{CacheEntry, CompositeKey, EvictionPolicy, QueryCacheConfig};

/// Upper bound on victims taken for memory pressure during one insert
pub const MAX_MEMORY_EVICTIONS_PER_INSERT: usize = 100;

/// What a capacity check removed, and whether it succeeded
#[derive(Debug, Default)]
pub struct EvictionOutcome {
    /// Entries removed because their TTL had passed
    pub expired: Vec<CacheEntry>,
    /// Entries removed by the policy
    pub evicted: Vec<CacheEntry>,
    /// Whether the incoming entry now fits
    pub satisfied: bool,
}

impl EvictionOutcome {
    pub fn removed(&self) -> usize {
        self.expired.len() + self.evicted.len()
    }
}

#[derive(Debug, Clone)]
pub struct EvictionController {
    policy: EvictionPolicy,
    max_entries: usize,
    memory_limit_bytes: u64,
    ttl: Duration,
}

impl EvictionController {
    pub fn new(config: &QueryCacheConfig) -> Self {
        Self {
            policy: config.eviction_policy,
            max_entries: config.max_entries,
            memory_limit_bytes: config.memory_eviction_threshold_bytes(),
            ttl: config.ttl(),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_bytes
    }

    /// Pick the next entry to evict under the active policy
    pub fn select_victim(&self, state: &CacheState) -> Option<CompositeKey> {
        let victim = match self.policy {
            EvictionPolicy::Recency => state
                .entries()
                .min_by_key(|e| (e.created_at(), e.sequence())),
            EvictionPolicy::Frequency => state
                .entries()
                .min_by_key(|e| (e.access_count(), e.created_at(), e.sequence())),
            EvictionPolicy::Size => state
                .entries()
                .max_by_key(|e| (e.memory_footprint(), Reverse(e.sequence()))),
        };

        victim.map(|e| e.key().clone())
    }

    fn over_count(&self, state: &CacheState) -> bool {
        state.len() + 1 > self.max_entries
    }

    fn over_memory(&self, state: &CacheState, incoming_bytes: u64) -> bool {
        state.memory_bytes().saturating_add(incoming_bytes) > self.memory_limit_bytes
    }

    /// Make room for one more entry of `incoming_bytes`
    ///
    /// Safe to call repeatedly: when nothing is over the ceilings it removes
    /// nothing. The caller must already have removed any entry the incoming
    /// one replaces.
    pub fn ensure_capacity(&self, state: &mut CacheState, incoming_bytes: u64) -> EvictionOutcome {
        let mut outcome = EvictionOutcome::default();

        if self.max_entries == 0 || incoming_bytes > self.memory_limit_bytes {
            return outcome;
        }

        if !self.over_count(state) && !self.over_memory(state, incoming_bytes) {
            outcome.satisfied = true;
            return outcome;
        }

        outcome.expired = state.remove_expired(self.ttl, Utc::now());

        while self.over_count(state) {
            match self.evict_one(state) {
                Some(entry) => outcome.evicted.push(entry),
                None => return outcome,
            }
        }

        let mut memory_evictions = 0;

        while self.over_memory(state, incoming_bytes) {
            if memory_evictions >= MAX_MEMORY_EVICTIONS_PER_INSERT {
                return outcome;
            }

            match self.evict_one(state) {
                Some(entry) => {
                    outcome.evicted.push(entry);
                    memory_evictions += 1;
                }
                None => return outcome,
            }
        }

        if outcome.removed() > 0 {
            debug!(
                expired = outcome.expired.len(),
                evicted = outcome.evicted.len(),
                policy = %self.policy,
                "Freed cache capacity"
            );
        }

        outcome.satisfied = true;
        outcome
    }

    fn evict_one(&self, state: &mut CacheState) -> Option<CacheEntry> {
        let key = self.select_victim(state)?;
        state.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query_cache::{CompositeKeyGenerator, QueryScope};
    use serde_json::json;

    struct Fixture {
        state: CacheState,
        sequence: u64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                state: CacheState::new(),
                sequence: 0,
            }
        }

        fn insert(&mut self, query: &str, size: u64) -> CompositeKey {
            let scope = QueryScope::new("net", "snap");
            let key = CompositeKeyGenerator::new("eviction-test").generate(query, &scope);
            self.sequence += 1;
            let entry = CacheEntry::new(key.clone(), query, scope, json!(query), size)
                .with_sequence(self.sequence);
            self.state.insert(entry);
            key
        }

        fn touch(&mut self, key: &CompositeKey, times: usize) {
            let entry = self.state.get_mut(key).unwrap();
            for _ in 0..times {
                entry.touch();
            }
        }
    }

    fn controller(policy: EvictionPolicy, max_entries: usize) -> EvictionController {
        EvictionController::new(
            &QueryCacheConfig::new()
                .with_max_entries(max_entries)
                .with_eviction_policy(policy),
        )
    }

    #[test]
    fn test_recency_evicts_oldest_creation() {
        let mut fx = Fixture::new();
        let q1 = fx.insert("q1", 10);
        let q2 = fx.insert("q2", 10);
        fx.touch(&q1, 5);

        let outcome = controller(EvictionPolicy::Recency, 2).ensure_capacity(&mut fx.state, 10);

        assert!(outcome.satisfied);
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].key(), &q1);
        assert!(fx.state.contains(&q2));
    }

    #[test]
    fn test_frequency_keeps_accessed_entry() {
        let mut fx = Fixture::new();
        let accessed = fx.insert("accessed", 10);
        let idle = fx.insert("idle", 10);
        fx.touch(&accessed, 2);

        let outcome = controller(EvictionPolicy::Frequency, 2).ensure_capacity(&mut fx.state, 10);

        assert_eq!(outcome.evicted[0].key(), &idle);
        assert!(fx.state.contains(&accessed));
    }

    #[test]
    fn test_frequency_ties_break_on_age() {
        let mut fx = Fixture::new();
        let first = fx.insert("first", 10);
        let second = fx.insert("second", 10);

        let outcome = controller(EvictionPolicy::Frequency, 2).ensure_capacity(&mut fx.state, 10);

        assert_eq!(outcome.evicted[0].key(), &first);
        assert!(fx.state.contains(&second));
    }

    #[test]
    fn test_size_evicts_largest() {
        let mut fx = Fixture::new();
        let small = fx.insert("small", 10);
        let large = fx.insert("large", 1000);
        let other = fx.insert("other", 10);

        let outcome = controller(EvictionPolicy::Size, 3).ensure_capacity(&mut fx.state, 10);

        assert_eq!(outcome.evicted[0].key(), &large);
        assert!(fx.state.contains(&small));
        assert!(fx.state.contains(&other));
    }

    #[test]
    fn test_size_policy_incoming_large_entry_survives() {
        let mut fx = Fixture::new();
        let keys: Vec<_> = (0..3).map(|i| fx.insert(&format!("small-{}", i), 10)).collect();

        let outcome = controller(EvictionPolicy::Size, 3).ensure_capacity(&mut fx.state, 1000);
        let large = fx.insert("large", 1000);

        assert!(outcome.satisfied);
        assert_eq!(outcome.evicted.len(), 1);
        assert!(keys.contains(outcome.evicted[0].key()));
        assert!(fx.state.contains(&large));
        assert_eq!(fx.state.len(), 3);
    }

    #[test]
    fn test_expired_purged_before_policy() {
        let mut fx = Fixture::new();
        let old = fx.insert("old", 10);
        let fresh = fx.insert("fresh", 10);
        fx.state
            .get_mut(&old)
            .unwrap()
            .backdate(chrono::Duration::days(2));
        fx.touch(&old, 10);

        let outcome = controller(EvictionPolicy::Frequency, 2).ensure_capacity(&mut fx.state, 10);

        assert!(outcome.satisfied);
        assert_eq!(outcome.expired.len(), 1);
        assert!(outcome.evicted.is_empty());
        assert!(fx.state.contains(&fresh));
    }

    #[test]
    fn test_noop_when_room_available() {
        let mut fx = Fixture::new();
        fx.insert("a", 10);

        let controller = controller(EvictionPolicy::Recency, 10);
        let first = controller.ensure_capacity(&mut fx.state, 10);
        let second = controller.ensure_capacity(&mut fx.state, 10);

        assert!(first.satisfied && second.satisfied);
        assert_eq!(first.removed() + second.removed(), 0);
        assert_eq!(fx.state.len(), 1);
    }

    #[test]
    fn test_memory_pressure_evicts_until_fit() {
        let mut fx = Fixture::new();
        for i in 0..4 {
            fx.insert(&format!("q{}", i), 200_000);
        }

        // 1 MB ceiling at 50% => ~524 KB usable
        let controller = EvictionController::new(
            &QueryCacheConfig::new()
                .with_max_memory_mb(1)
                .with_memory_eviction_threshold_fraction(0.5),
        );
        let outcome = controller.ensure_capacity(&mut fx.state, 200_000);

        assert!(outcome.satisfied);
        assert_eq!(outcome.evicted.len(), 3);
        assert!(fx.state.memory_bytes() + 200_000 <= controller.memory_limit_bytes());
    }

    #[test]
    fn test_oversized_entry_unsatisfied() {
        let mut fx = Fixture::new();
        fx.insert("a", 10);

        let controller = EvictionController::new(&QueryCacheConfig::new().with_max_memory_mb(1));
        let outcome = controller.ensure_capacity(&mut fx.state, 2 * 1024 * 1024);

        assert!(!outcome.satisfied);
        assert_eq!(outcome.removed(), 0);
        assert_eq!(fx.state.len(), 1);
    }

    #[test]
    fn test_zero_max_entries_unsatisfied() {
        let mut fx = Fixture::new();

        let outcome = controller(EvictionPolicy::Recency, 0).ensure_capacity(&mut fx.state, 10);

        assert!(!outcome.satisfied);
    }
}
