//! Query result cache domain models
//!
//! Entries are identified by a composite key over the cache instance, the
//! query text and its scope. Entries that carry an embedding can also answer
//! paraphrased lookups within the same scope.

mod config;
mod entry;
mod key;
mod policy;

use std::collections::BTreeMap;

pub use config::{validate_cache_config, CacheConfigValidationError, QueryCacheConfig};
pub use entry::{CacheEntry, CachedResult, MatchKind, StoredPayload, ENTRY_OVERHEAD_BYTES};
pub use key::{CompositeKey, CompositeKeyGenerator, QueryScope};
pub use policy::EvictionPolicy;

/// Flat key/value metrics snapshot
pub type CacheStats = BTreeMap<String, serde_json::Value>;
