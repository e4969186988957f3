//! Cache entry model

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{CompositeKey, QueryScope};

/// Fixed per-entry bookkeeping cost added to every footprint estimate
pub const ENTRY_OVERHEAD_BYTES: u64 = 256;

/// The single authoritative representation of an entry's result
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPayload {
    /// Decoded result object
    InMemory(Value),
    /// Gzip-compressed serialized result
    Compressed(Vec<u8>),
    /// Spilled to a file in the overflow directory
    OnDisk { path: PathBuf, compressed: bool },
}

impl StoredPayload {
    /// Bytes this representation occupies in memory
    pub fn resident_bytes(&self, uncompressed_size: u64) -> u64 {
        match self {
            Self::InMemory(_) => uncompressed_size,
            Self::Compressed(bytes) => bytes.len() as u64,
            Self::OnDisk { path, .. } => path.as_os_str().len() as u64,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "memory",
            Self::Compressed(_) => "compressed",
            Self::OnDisk { .. } => "disk",
        }
    }
}

/// One cached query result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CompositeKey,
    query: String,
    scope: QueryScope,
    embedding: Option<Vec<f32>>,
    payload: StoredPayload,
    uncompressed_size: u64,
    compressed_size: u64,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    access_count: u64,
    sequence: u64,
}

impl CacheEntry {
    /// Create an entry holding the decoded payload in memory
    pub fn new(
        key: CompositeKey,
        query: impl Into<String>,
        scope: QueryScope,
        payload: Value,
        uncompressed_size: u64,
    ) -> Self {
        let now = Utc::now();

        Self {
            key,
            query: query.into(),
            scope,
            embedding: None,
            payload: StoredPayload::InMemory(payload),
            uncompressed_size,
            compressed_size: 0,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            sequence: 0,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Insertion order, used to break creation-time ties
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Replace the in-memory payload with its compressed form
    pub fn set_compressed(&mut self, bytes: Vec<u8>) {
        self.compressed_size = bytes.len() as u64;
        self.payload = StoredPayload::Compressed(bytes);
    }

    /// Replace the resident payload with a reference to its spilled file
    pub fn set_on_disk(&mut self, path: PathBuf, compressed: bool, compressed_size: u64) {
        self.compressed_size = compressed_size;
        self.payload = StoredPayload::OnDisk { path, compressed };
    }

    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn scope(&self) -> &QueryScope {
        &self.scope
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    pub fn payload(&self) -> &StoredPayload {
        &self.payload
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    pub fn is_compressed(&self) -> bool {
        match &self.payload {
            StoredPayload::InMemory(_) => false,
            StoredPayload::Compressed(_) => true,
            StoredPayload::OnDisk { compressed, .. } => *compressed,
        }
    }

    pub fn disk_path(&self) -> Option<&Path> {
        match &self.payload {
            StoredPayload::OnDisk { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Expiry runs from creation, not from the last access
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);

        match age.to_std() {
            Ok(age) => age > ttl,
            Err(_) => false,
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(ttl, Utc::now())
    }

    /// Estimated memory footprint in bytes
    pub fn memory_footprint(&self) -> u64 {
        let embedding_bytes = self
            .embedding
            .as_ref()
            .map(|e| (e.len() * std::mem::size_of::<f32>()) as u64)
            .unwrap_or(0);

        ENTRY_OVERHEAD_BYTES
            + self.query.len() as u64
            + self.scope.network.len() as u64
            + self.scope.snapshot.len() as u64
            + embedding_bytes
            + self.payload.resident_bytes(self.uncompressed_size)
    }

    /// Record a hit
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
        self.access_count += 1;
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: chrono::Duration) {
        self.created_at -= by;
        self.last_accessed_at -= by;
    }
}

/// How a lookup was satisfied
#[derive(Debug, Clone, PartialEq)]
pub enum MatchKind {
    /// Composite key matched
    Exact,
    /// A paraphrase matched by embedding similarity
    Semantic {
        similarity: f32,
        matched_query: String,
    },
}

/// A successful cache lookup
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// The decoded result payload
    pub payload: Value,
    /// Exact or semantic match, with the transient similarity score
    pub match_kind: MatchKind,
    /// Access count after this hit
    pub access_count: u64,
    /// When the matched entry was created
    pub cached_at: DateTime<Utc>,
}

impl CachedResult {
    pub fn similarity(&self) -> Option<f32> {
        match &self.match_kind {
            MatchKind::Exact => None,
            MatchKind::Semantic { similarity, .. } => Some(*similarity),
        }
    }

    pub fn is_semantic(&self) -> bool {
        matches!(self.match_kind, MatchKind::Semantic { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query_cache::CompositeKeyGenerator;

    fn create_entry(query: &str) -> CacheEntry {
        let scope = QueryScope::new("net", "snap");
        let key = CompositeKeyGenerator::new("test").generate(query, &scope);
        CacheEntry::new(key, query, scope, serde_json::json!({"rows": []}), 100)
    }

    #[test]
    fn test_new_entry_defaults() {
        let entry = create_entry("show interfaces");

        assert_eq!(entry.access_count(), 1);
        assert_eq!(entry.created_at(), entry.last_accessed_at());
        assert!(!entry.is_compressed());
        assert!(entry.disk_path().is_none());
        assert!(entry.embedding().is_none());
        assert_eq!(entry.payload().kind(), "memory");
    }

    #[test]
    fn test_touch_updates_access() {
        let mut entry = create_entry("q");
        let created = entry.created_at();

        entry.touch();
        entry.touch();

        assert_eq!(entry.access_count(), 3);
        assert!(entry.last_accessed_at() >= created);
        assert_eq!(entry.created_at(), created);
    }

    #[test]
    fn test_expiry_ignores_access() {
        let mut entry = create_entry("q");
        entry.backdate(chrono::Duration::hours(2));
        entry.touch();

        assert!(entry.is_expired(Duration::from_secs(3600)));
        assert!(!entry.is_expired(Duration::from_secs(3 * 3600)));
    }

    #[test]
    fn test_representation_switches() {
        let mut entry = create_entry("q").with_embedding(vec![0.0; 8]);
        let in_memory = entry.memory_footprint();

        entry.set_compressed(vec![1, 2, 3, 4]);
        assert!(entry.is_compressed());
        assert_eq!(entry.compressed_size(), 4);
        assert_eq!(in_memory - entry.memory_footprint(), 96);

        entry.set_on_disk(PathBuf::from("/tmp/x.json"), true, 4);
        assert_eq!(entry.disk_path(), Some(Path::new("/tmp/x.json")));
        assert!(entry.is_compressed());
        assert_eq!(entry.payload().kind(), "disk");
    }

    #[test]
    fn test_footprint_counts_embedding() {
        let entry = create_entry("q");
        let with_embedding = create_entry("q").with_embedding(vec![0.0; 10]);

        assert_eq!(
            with_embedding.memory_footprint() - entry.memory_footprint(),
            40
        );
    }
}
