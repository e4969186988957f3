//! Running cache counters and the stats snapshot

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde_json::json;

use crate::domain::query_cache::{CacheStats, EvictionPolicy, QueryCacheConfig};

/// Sentinel for "no sample recorded yet" in a smoothed average
const NO_SAMPLE: u64 = u64::MAX;

/// Lock-free `avg = (avg + new) / 2` running average
#[derive(Debug)]
struct SmoothedAverage(AtomicU64);

impl SmoothedAverage {
    fn new() -> Self {
        Self(AtomicU64::new(NO_SAMPLE))
    }

    fn record(&self, sample: f64) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let next = if bits == NO_SAMPLE {
                    sample
                } else {
                    (f64::from_bits(bits) + sample) / 2.0
                };
                Some(next.to_bits())
            });
    }

    fn get(&self) -> f64 {
        match self.0.load(Ordering::Relaxed) {
            NO_SAMPLE => 0.0,
            bits => f64::from_bits(bits),
        }
    }
}

/// Values the collector does not own but reports
#[derive(Debug, Clone, Copy)]
pub struct StoreGauges {
    pub entry_count: usize,
    pub indexed_count: usize,
    pub memory_bytes: u64,
}

/// Process-lifetime counters for one cache instance
#[derive(Debug)]
pub struct MetricsCollector {
    emit: bool,
    total_queries: AtomicU64,
    hits: AtomicU64,
    semantic_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    evictions_by_policy: [AtomicU64; 3],
    compression_ratio: SmoothedAverage,
    response_time_ms: SmoothedAverage,
    last_cleanup_millis: AtomicU64,
}

fn policy_slot(policy: EvictionPolicy) -> usize {
    match policy {
        EvictionPolicy::Recency => 0,
        EvictionPolicy::Frequency => 1,
        EvictionPolicy::Size => 2,
    }
}

impl MetricsCollector {
    /// Create a collector; `emit` forwards counters to the metrics recorder
    pub fn new(emit: bool) -> Self {
        Self {
            emit,
            total_queries: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            semantic_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            evictions_by_policy: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            compression_ratio: SmoothedAverage::new(),
            response_time_ms: SmoothedAverage::new(),
            last_cleanup_millis: AtomicU64::new(0),
        }
    }

    pub fn record_query(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self, semantic: bool) {
        self.hits.fetch_add(1, Ordering::Relaxed);

        if semantic {
            self.semantic_hits.fetch_add(1, Ordering::Relaxed);
        }

        if self.emit {
            let kind = if semantic { "semantic" } else { "exact" };
            counter!("netquery_cache_hits_total", "kind" => kind).increment(1);
        }
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);

        if self.emit {
            counter!("netquery_cache_misses_total").increment(1);
        }
    }

    pub fn record_eviction(&self, policy: EvictionPolicy) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.evictions_by_policy[policy_slot(policy)].fetch_add(1, Ordering::Relaxed);

        if self.emit {
            counter!("netquery_cache_evictions_total", "policy" => policy.as_str()).increment(1);
        }
    }

    /// Record compressed / uncompressed for one payload
    pub fn record_compression(&self, compressed: u64, uncompressed: u64) {
        if uncompressed == 0 {
            return;
        }

        self.compression_ratio
            .record(compressed as f64 / uncompressed as f64);
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        self.response_time_ms.record(millis);

        if self.emit {
            histogram!("netquery_cache_lookup_seconds").record(elapsed.as_secs_f64());
        }
    }

    pub fn record_cleanup(&self, at: DateTime<Utc>) {
        let millis = at.timestamp_millis().max(0) as u64;
        self.last_cleanup_millis.store(millis, Ordering::Relaxed);
    }

    /// Publish the current size gauges to the recorder
    pub fn publish_gauges(&self, gauges: StoreGauges) {
        if self.emit {
            gauge!("netquery_cache_entries").set(gauges.entry_count as f64);
            gauge!("netquery_cache_memory_bytes").set(gauges.memory_bytes as f64);
        }
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn semantic_hits(&self) -> u64 {
        self.semantic_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn evictions_for(&self, policy: EvictionPolicy) -> u64 {
        self.evictions_by_policy[policy_slot(policy)].load(Ordering::Relaxed)
    }

    pub fn compression_ratio(&self) -> f64 {
        self.compression_ratio.get()
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        self.response_time_ms.get()
    }

    pub fn last_cleanup(&self) -> Option<DateTime<Utc>> {
        match self.last_cleanup_millis.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis as i64),
        }
    }

    /// Hit rate as a percentage of all lookups
    pub fn hit_rate_percent(&self) -> f64 {
        let total = self.total_queries();

        if total == 0 {
            return 0.0;
        }

        self.hits() as f64 / total as f64 * 100.0
    }

    /// Build the flat stats map
    pub fn snapshot(&self, config: &QueryCacheConfig, gauges: StoreGauges) -> CacheStats {
        let mut stats = CacheStats::new();
        let max_memory = config.max_memory_bytes();
        let memory_percent = if max_memory == 0 {
            0.0
        } else {
            gauges.memory_bytes as f64 / max_memory as f64 * 100.0
        };

        stats.insert("enabled".into(), json!(config.enabled));
        stats.insert("total_queries".into(), json!(self.total_queries()));
        stats.insert("cache_hits".into(), json!(self.hits()));
        stats.insert("semantic_hits".into(), json!(self.semantic_hits()));
        stats.insert("cache_misses".into(), json!(self.misses()));
        stats.insert("hit_rate_percent".into(), json!(self.hit_rate_percent()));
        stats.insert("entry_count".into(), json!(gauges.entry_count));
        stats.insert("max_entries".into(), json!(config.max_entries));
        stats.insert("similarity_index_size".into(), json!(gauges.indexed_count));
        stats.insert("memory_bytes".into(), json!(gauges.memory_bytes));
        stats.insert(
            "memory_mb".into(),
            json!(gauges.memory_bytes as f64 / (1024.0 * 1024.0)),
        );
        stats.insert("memory_percent".into(), json!(memory_percent));
        stats.insert("max_memory_mb".into(), json!(config.max_memory_mb));
        stats.insert("compression_enabled".into(), json!(config.compress_results));
        stats.insert("compression_ratio".into(), json!(self.compression_ratio()));
        stats.insert(
            "avg_response_time_ms".into(),
            json!(self.avg_response_time_ms()),
        );
        stats.insert("evictions_total".into(), json!(self.evictions()));

        for policy in EvictionPolicy::ALL {
            stats.insert(
                format!("evictions_{}", policy.as_str()),
                json!(self.evictions_for(policy)),
            );
        }

        stats.insert("ttl_hours".into(), json!(config.ttl_hours));
        stats.insert(
            "eviction_policy".into(),
            json!(config.eviction_policy.as_str()),
        );
        stats.insert(
            "cleanup_interval_minutes".into(),
            json!(config.cleanup_interval_minutes),
        );
        stats.insert(
            "last_cleanup".into(),
            json!(self.last_cleanup().map(|t| t.to_rfc3339())),
        );
        stats.insert("persist_to_disk".into(), json!(config.persist_to_disk));
        stats.insert(
            "disk_cache_path".into(),
            json!(config.disk_cache_path.display().to_string()),
        );
        stats.insert("metrics_enabled".into(), json!(config.metrics_enabled));

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauges() -> StoreGauges {
        StoreGauges {
            entry_count: 3,
            indexed_count: 2,
            memory_bytes: 512 * 1024,
        }
    }

    #[test]
    fn test_smoothed_average() {
        let avg = SmoothedAverage::new();
        assert_eq!(avg.get(), 0.0);

        avg.record(10.0);
        assert_eq!(avg.get(), 10.0);

        avg.record(20.0);
        assert_eq!(avg.get(), 15.0);

        avg.record(5.0);
        assert_eq!(avg.get(), 10.0);
    }

    #[test]
    fn test_hit_rate() {
        let collector = MetricsCollector::new(false);
        assert_eq!(collector.hit_rate_percent(), 0.0);

        for _ in 0..4 {
            collector.record_query();
        }
        collector.record_hit(false);
        collector.record_hit(true);
        collector.record_hit(false);
        collector.record_miss();

        assert_eq!(collector.hits(), 3);
        assert_eq!(collector.semantic_hits(), 1);
        assert!((collector.hit_rate_percent() - 75.0).abs() < 0.001);
    }

    #[test]
    fn test_evictions_by_policy() {
        let collector = MetricsCollector::new(true);
        collector.record_eviction(EvictionPolicy::Size);
        collector.record_eviction(EvictionPolicy::Size);
        collector.record_eviction(EvictionPolicy::Recency);

        assert_eq!(collector.evictions(), 3);
        assert_eq!(collector.evictions_for(EvictionPolicy::Size), 2);
        assert_eq!(collector.evictions_for(EvictionPolicy::Recency), 1);
        assert_eq!(collector.evictions_for(EvictionPolicy::Frequency), 0);
    }

    #[test]
    fn test_compression_ratio_ignores_empty_payloads() {
        let collector = MetricsCollector::new(false);
        collector.record_compression(10, 0);
        assert_eq!(collector.compression_ratio(), 0.0);

        collector.record_compression(25, 100);
        assert!((collector.compression_ratio() - 0.25).abs() < 0.0001);
    }

    #[test]
    fn test_snapshot_keys() {
        let collector = MetricsCollector::new(false);
        let config = QueryCacheConfig::new().with_max_memory_mb(1);
        let now = Utc::now();
        collector.record_cleanup(now);
        collector.record_response_time(Duration::from_millis(4));

        let stats = collector.snapshot(&config, gauges());

        assert_eq!(stats["entry_count"], json!(3));
        assert_eq!(stats["similarity_index_size"], json!(2));
        assert_eq!(stats["memory_percent"], json!(50.0));
        assert_eq!(stats["memory_mb"], json!(0.5));
        assert_eq!(stats["eviction_policy"], json!("recency"));
        assert_eq!(stats["evictions_size"], json!(0));
        assert!(stats["avg_response_time_ms"].as_f64().unwrap() >= 4.0);
        assert!(stats["last_cleanup"].is_string());
        assert!(stats.contains_key("disk_cache_path"));
    }
}
