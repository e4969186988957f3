//! Composite key derivation

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Caller-supplied identifiers a semantic hit must agree on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryScope {
    /// Target network (first scope key)
    pub network: String,
    /// Snapshot within the network (second scope key)
    pub snapshot: String,
}

impl QueryScope {
    pub fn new(network: impl Into<String>, snapshot: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            snapshot: snapshot.into(),
        }
    }

    /// Whether an entry stored under `stored` may answer a lookup in this scope
    ///
    /// Empty scope keys on the lookup side act as wildcards.
    pub fn admits(&self, stored: &QueryScope) -> bool {
        (self.network.is_empty() || self.network == stored.network)
            && (self.snapshot.is_empty() || self.snapshot == stored.snapshot)
    }
}

/// Hex-encoded SHA-256 key identifying one cached query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a key from its hex form, e.g. a disk file stem
    pub fn from_hex(hex_key: &str) -> Option<Self> {
        let decoded = hex::decode(hex_key).ok()?;

        if decoded.len() == 32 {
            Some(Self(hex_key.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives composite keys bound to one cache instance
#[derive(Debug, Clone)]
pub struct CompositeKeyGenerator {
    instance_id: String,
}

impl CompositeKeyGenerator {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Hash (instance id, query, network, snapshot) into a key
    pub fn generate(&self, query: &str, scope: &QueryScope) -> CompositeKey {
        let mut hasher = Sha256::new();

        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for part in [
            self.instance_id.as_str(),
            query,
            scope.network.as_str(),
            scope.snapshot.as_str(),
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }

        CompositeKey(hex::encode(hasher.finalize()))
    }
}
