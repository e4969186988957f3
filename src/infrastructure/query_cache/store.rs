//! Query result cache facade
//!
//! Coordinates key derivation, exact and semantic lookup, compression, disk
//! spillover and eviction over a single [`CacheState`] lock.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::codec::PayloadCodec;
use super::disk::DiskOverflowStore;
use super::eviction::{EvictionController, EvictionOutcome};
use super::metrics::{MetricsCollector, StoreGauges};
use super::state::CacheState;
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::query_cache::{
    validate_cache_config, CacheEntry, CacheStats, CachedResult, CompositeKey,
    CompositeKeyGenerator, MatchKind, QueryCacheConfig, QueryScope, StoredPayload,
};
use crate::domain::DomainError;

/// What a lookup copies out of an entry before releasing the read lock
#[derive(Debug)]
struct HitSnapshot {
    payload: StoredPayload,
    access_count: u64,
    created_at: DateTime<Utc>,
}

impl HitSnapshot {
    fn of(entry: &CacheEntry) -> Self {
        Self {
            payload: entry.payload().clone(),
            access_count: entry.access_count(),
            created_at: entry.created_at(),
        }
    }
}

/// In-process cache for expensive network query results
#[derive(Debug)]
pub struct QueryResultCache {
    config: QueryCacheConfig,
    key_generator: CompositeKeyGenerator,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    codec: PayloadCodec,
    disk: Option<DiskOverflowStore>,
    eviction: EvictionController,
    metrics: MetricsCollector,
    state: RwLock<CacheState>,
    sequence: AtomicU64,
}

impl QueryResultCache {
    /// Create a cache with a fresh instance id and no embedding provider
    pub fn new(config: QueryCacheConfig) -> Result<Self, DomainError> {
        if let Err(errors) = validate_cache_config(&config) {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DomainError::configuration(message));
        }

        let codec = PayloadCodec::new(config.compression_level);
        let disk = config
            .persist_to_disk
            .then(|| DiskOverflowStore::new(&config.disk_cache_path, codec));

        Ok(Self {
            key_generator: CompositeKeyGenerator::new(Uuid::new_v4().to_string()),
            embedding_provider: None,
            codec,
            disk,
            eviction: EvictionController::new(&config),
            metrics: MetricsCollector::new(config.metrics_enabled),
            state: RwLock::new(CacheState::new()),
            sequence: AtomicU64::new(0),
            config,
        })
    }

    /// Enable semantic matching with the given embedding provider
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Use a fixed instance id instead of a random one
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.key_generator = CompositeKeyGenerator::new(instance_id);
        self
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        self.key_generator.instance_id()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn has_embedding_provider(&self) -> bool {
        self.embedding_provider.is_some()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Derive the composite key for a query in a scope
    pub fn key_for(&self, query: &str, scope: &QueryScope) -> CompositeKey {
        self.key_generator.generate(query, scope)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, CacheState>, DomainError> {
        self.state
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, CacheState>, DomainError> {
        self.state
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    /// Embed a query, degrading to `None` when no provider is set or it fails
    async fn embed(&self, query: &str) -> Option<Vec<f32>> {
        let provider = self.embedding_provider.as_ref()?;

        match provider.embed(query).await {
            Ok(embedding) if !embedding.is_empty() => Some(embedding),
            Ok(_) => {
                warn!(
                    provider = provider.provider_name(),
                    "Embedding provider returned an empty vector"
                );
                None
            }
            Err(e) => {
                warn!(
                    provider = provider.provider_name(),
                    "Failed to embed query, using exact match only: {}", e
                );
                None
            }
        }
    }

    /// Store a result
    ///
    /// Replaces any entry with the same key. Fails only when eviction cannot
    /// free enough room; every other problem degrades the entry instead.
    /// Disk spills are written on tokio's blocking pool.
    pub async fn put(
        &self,
        query: &str,
        scope: &QueryScope,
        payload: Value,
    ) -> Result<(), DomainError> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = self.key_for(query, scope);
        let embedding = self.embed(query).await;
        let entry = self.build_entry(key, query, scope, payload, embedding)?;
        let entry = self.spill_if_oversized(entry).await;

        self.insert_entry(entry)
    }

    fn build_entry(
        &self,
        key: CompositeKey,
        query: &str,
        scope: &QueryScope,
        payload: Value,
        embedding: Option<Vec<f32>>,
    ) -> Result<CacheEntry, DomainError> {
        let compressed = if self.config.compress_results {
            match self.codec.compress(&payload) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(key = %key, "Compression failed, storing uncompressed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let uncompressed_size = match &compressed {
            Some((_, size)) => *size,
            None => PayloadCodec::serialized_size(&payload)?,
        };

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut entry = CacheEntry::new(key, query, scope.clone(), payload, uncompressed_size)
            .with_sequence(sequence);

        if let Some(embedding) = embedding {
            entry = entry.with_embedding(embedding);
        }

        if let Some((bytes, _)) = compressed {
            self.metrics
                .record_compression(bytes.len() as u64, uncompressed_size);
            entry.set_compressed(bytes);
        }

        Ok(entry)
    }

    /// Move an oversized payload to its own overflow file
    ///
    /// Any failure leaves the entry in memory.
    async fn spill_if_oversized(&self, mut entry: CacheEntry) -> CacheEntry {
        let disk = match &self.disk {
            Some(disk) if entry.memory_footprint() > self.config.disk_spill_threshold_bytes() => {
                disk.clone()
            }
            _ => return entry,
        };

        let spill = match disk.prepare(&entry) {
            Ok(Some(spill)) => spill,
            Ok(None) => return entry,
            Err(e) => {
                warn!(key = %entry.key(), "Disk spill failed, keeping entry in memory: {}", e);
                return entry;
            }
        };

        let written =
            tokio::task::spawn_blocking(move || disk.write(&spill).map(|()| spill)).await;

        match written {
            Ok(Ok(spill)) => spill.apply(&mut entry),
            Ok(Err(e)) => {
                warn!(key = %entry.key(), "Disk spill failed, keeping entry in memory: {}", e);
            }
            Err(e) => {
                warn!(key = %entry.key(), "Disk spill task failed, keeping entry in memory: {}", e);
            }
        }

        entry
    }

    fn insert_entry(&self, entry: CacheEntry) -> Result<(), DomainError> {
        let incoming_bytes = entry.memory_footprint();
        let new_path = entry.disk_path().map(Path::to_path_buf);

        let mut state = self.write_state()?;
        let replaced = state.remove(entry.key());
        let outcome = self.eviction.ensure_capacity(&mut state, incoming_bytes);

        if !outcome.satisfied {
            let gauges = Self::gauges(&state);
            drop(state);

            self.finish_eviction(outcome, gauges);
            self.discard_files(replaced, new_path.as_deref());

            if let Some(path) = &new_path {
                self.remove_file(path);
            }

            return Err(DomainError::capacity_exceeded(format!(
                "No room for entry of {} bytes (limit {} entries / {} bytes)",
                incoming_bytes,
                self.config.max_entries,
                self.eviction.memory_limit_bytes()
            )));
        }

        debug!(
            key = %entry.key(),
            bytes = incoming_bytes,
            representation = entry.payload().kind(),
            semantic = entry.embedding().is_some(),
            "Cached query result"
        );

        state.insert(entry);
        let gauges = Self::gauges(&state);
        drop(state);

        self.finish_eviction(outcome, gauges);
        self.discard_files(replaced, new_path.as_deref());

        Ok(())
    }

    fn gauges(state: &CacheState) -> StoreGauges {
        StoreGauges {
            entry_count: state.len(),
            indexed_count: state.index().len(),
            memory_bytes: state.memory_bytes(),
        }
    }

    /// Record eviction metrics and delete spilled files, outside the lock
    fn finish_eviction(&self, outcome: EvictionOutcome, gauges: StoreGauges) {
        if !outcome.expired.is_empty() {
            self.metrics.record_cleanup(Utc::now());
        }

        for _ in &outcome.evicted {
            self.metrics.record_eviction(self.eviction.policy());
        }

        self.metrics.publish_gauges(gauges);
        self.discard_files(outcome.expired, None);
        self.discard_files(outcome.evicted, None);
    }

    fn discard_files<I>(&self, entries: I, keep: Option<&Path>)
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        for entry in entries {
            if let Some(path) = entry.disk_path() {
                if Some(path) != keep {
                    self.remove_file(path);
                }
            }
        }
    }

    fn remove_file(&self, path: &Path) {
        if let Some(disk) = &self.disk {
            disk.remove(path);
        }
    }

    /// Decode whatever representation an entry holds
    fn materialize(&self, payload: StoredPayload) -> Result<Value, DomainError> {
        match payload {
            StoredPayload::InMemory(value) => Ok(value),
            StoredPayload::Compressed(bytes) => self.codec.decompress(&bytes),
            StoredPayload::OnDisk { path, .. } => match &self.disk {
                Some(disk) => disk.load(&path),
                None => Err(DomainError::disk_read(format!(
                    "Entry spilled to {} but disk persistence is off",
                    path.display()
                ))),
            },
        }
    }

    /// Look up a result by exact key, then by semantic similarity
    ///
    /// Expired entries are never returned. Read failures on a found entry
    /// count as a miss.
    pub async fn get(
        &self,
        query: &str,
        scope: &QueryScope,
    ) -> Result<Option<CachedResult>, DomainError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let started = Instant::now();
        self.metrics.record_query();

        let key = self.key_for(query, scope);
        let result = match self.lookup_exact(&key)? {
            Some(result) => Some(result),
            None => self.lookup_semantic(query, scope).await?,
        };

        match &result {
            Some(found) => self.metrics.record_hit(found.is_semantic()),
            None => self.metrics.record_miss(),
        }

        self.metrics.record_response_time(started.elapsed());

        Ok(result)
    }

    fn lookup_exact(&self, key: &CompositeKey) -> Result<Option<CachedResult>, DomainError> {
        let snapshot = {
            let state = self.read_state()?;

            match state.get(key) {
                Some(entry) if !entry.is_expired(self.config.ttl()) => HitSnapshot::of(entry),
                _ => return Ok(None),
            }
        };

        self.resolve_hit(key, snapshot, MatchKind::Exact)
    }

    async fn lookup_semantic(
        &self,
        query: &str,
        scope: &QueryScope,
    ) -> Result<Option<CachedResult>, DomainError> {
        let embedding = match self.embed(query).await {
            Some(embedding) => embedding,
            None => return Ok(None),
        };

        let ttl = self.config.ttl();
        let (key, snapshot, match_kind) = {
            let state = self.read_state()?;
            let now = Utc::now();

            let best = state.index().find_best_match(
                &embedding,
                scope,
                self.config.similarity_threshold,
                |k| state.get(k).map_or(false, |e| !e.is_expired_at(ttl, now)),
            );

            let best = match best {
                Some(best) => best,
                None => return Ok(None),
            };

            let entry = match state.get(&best.key) {
                Some(entry) => entry,
                None => return Ok(None),
            };

            debug!(
                similarity = best.similarity,
                matched = entry.query(),
                "Semantic cache hit"
            );

            let match_kind = MatchKind::Semantic {
                similarity: best.similarity,
                matched_query: entry.query().to_string(),
            };

            (best.key, HitSnapshot::of(entry), match_kind)
        };

        self.resolve_hit(&key, snapshot, match_kind)
    }

    /// Decode a hit's payload and record the access on its entry
    ///
    /// If the entry was removed after the snapshot, the counters come from
    /// the snapshot with this access added.
    fn resolve_hit(
        &self,
        key: &CompositeKey,
        snapshot: HitSnapshot,
        match_kind: MatchKind,
    ) -> Result<Option<CachedResult>, DomainError> {
        let value = match self.materialize(snapshot.payload) {
            Ok(value) => value,
            Err(e) if e.is_read_failure() => {
                warn!(key = %key, "Cached entry unreadable, treating as miss: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut state = self.write_state()?;
        let (access_count, cached_at) = match state.get_mut(key) {
            Some(entry) => {
                entry.touch();
                (entry.access_count(), entry.created_at())
            }
            None => (snapshot.access_count + 1, snapshot.created_at),
        };

        Ok(Some(CachedResult {
            payload: value,
            match_kind,
            access_count,
            cached_at,
        }))
    }

    /// Whether a live entry exists for this exact query and scope
    pub fn contains(&self, query: &str, scope: &QueryScope) -> Result<bool, DomainError> {
        let key = self.key_for(query, scope);
        let state = self.read_state()?;

        Ok(state
            .get(&key)
            .map_or(false, |e| !e.is_expired(self.config.ttl())))
    }

    /// Remove one entry by query and scope
    pub fn delete(&self, query: &str, scope: &QueryScope) -> Result<bool, DomainError> {
        let key = self.key_for(query, scope);
        let removed = self.write_state()?.remove(&key);
        let found = removed.is_some();

        self.discard_files(removed, None);

        Ok(found)
    }

    /// Remove every entry stored under a network
    pub fn invalidate_network(&self, network: &str) -> Result<usize, DomainError> {
        let removed = self
            .write_state()?
            .remove_where(|entry| entry.scope().network == network);
        let count = removed.len();

        self.discard_files(removed, None);
        debug!(network, count, "Invalidated network entries");

        Ok(count)
    }

    /// Remove every expired entry
    pub fn clear_expired(&self) -> Result<usize, DomainError> {
        let now = Utc::now();
        let (removed, gauges) = {
            let mut state = self.write_state()?;
            let removed = state.remove_expired(self.config.ttl(), now);
            (removed, Self::gauges(&state))
        };
        let count = removed.len();

        self.metrics.record_cleanup(now);
        self.metrics.publish_gauges(gauges);
        self.discard_files(removed, None);

        if count > 0 {
            debug!(count, "Removed expired cache entries");
        }

        Ok(count)
    }

    /// Remove entries; everything when `all`, otherwise only expired ones
    pub fn clear(&self, all: bool) -> Result<usize, DomainError> {
        if !all {
            return self.clear_expired();
        }

        let (removed, gauges) = {
            let mut state = self.write_state()?;
            let removed = state.drain();
            (removed, Self::gauges(&state))
        };
        let count = removed.len();

        self.metrics.publish_gauges(gauges);
        self.discard_files(removed, None);

        Ok(count)
    }

    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self.read_state()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.read_state()?.is_empty())
    }

    pub fn memory_bytes(&self) -> Result<u64, DomainError> {
        Ok(self.read_state()?.memory_bytes())
    }

    /// Keys of entries currently spilled to disk
    pub fn spilled_keys(&self) -> Result<HashSet<CompositeKey>, DomainError> {
        Ok(self
            .read_state()?
            .entries()
            .filter(|e| e.disk_path().is_some())
            .map(|e| e.key().clone())
            .collect())
    }

    /// Delete overflow files not referenced by this instance
    pub fn reclaim_disk(&self) -> Result<usize, DomainError> {
        match &self.disk {
            Some(disk) => disk.reclaim_orphans(&self.spilled_keys()?),
            None => Ok(0),
        }
    }

    /// Flat metrics snapshot
    pub fn stats(&self) -> Result<CacheStats, DomainError> {
        let gauges = Self::gauges(&*self.read_state()?);

        Ok(self.metrics.snapshot(&self.config, gauges))
    }
}
