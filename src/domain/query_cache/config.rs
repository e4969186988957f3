//! Query result cache configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EvictionPolicy;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration for the query result cache
///
/// Field names are camelCase; the lowercase aliases accept keys from
/// environment variables, which arrive lowercased.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCacheConfig {
    /// Whether caching is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries held at once
    #[serde(default = "default_max_entries", alias = "maxentries")]
    pub max_entries: usize,

    /// Entry lifetime in hours, measured from creation
    #[serde(default = "default_ttl_hours", alias = "ttlhours")]
    pub ttl_hours: f64,

    /// Minimum cosine similarity for a semantic hit (0.0 to 1.0)
    #[serde(
        default = "default_similarity_threshold",
        alias = "similaritythreshold"
    )]
    pub similarity_threshold: f32,

    /// Memory ceiling in megabytes
    #[serde(
        default = "default_max_memory_mb",
        rename = "maxMemoryMB",
        alias = "maxmemorymb"
    )]
    pub max_memory_mb: u64,

    /// Victim selection policy
    #[serde(default, alias = "evictionpolicy")]
    pub eviction_policy: EvictionPolicy,

    /// Whether payloads are gzip-compressed in memory
    #[serde(default = "default_true", alias = "compressresults")]
    pub compress_results: bool,

    /// Gzip level (1-9)
    #[serde(default = "default_compression_level", alias = "compressionlevel")]
    pub compression_level: u32,

    /// Whether oversized entries spill to disk
    #[serde(default, alias = "persisttodisk")]
    pub persist_to_disk: bool,

    /// Directory for spilled entries
    #[serde(default = "default_disk_cache_path", alias = "diskcachepath")]
    pub disk_cache_path: PathBuf,

    /// Whether counters are forwarded to the metrics recorder
    #[serde(default = "default_true", alias = "metricsenabled")]
    pub metrics_enabled: bool,

    /// Fraction of the memory ceiling at which memory eviction starts
    #[serde(
        default = "default_memory_eviction_threshold_fraction",
        alias = "memoryevictionthresholdfraction"
    )]
    pub memory_eviction_threshold_fraction: f64,

    /// Minutes between background expiry sweeps
    #[serde(
        default = "default_cleanup_interval_minutes",
        alias = "cleanupintervalminutes"
    )]
    pub cleanup_interval_minutes: f64,

    /// Fraction of the memory ceiling above which an entry spills to disk
    #[serde(default = "default_disk_spill_fraction", alias = "diskspillfraction")]
    pub disk_spill_fraction: f64,
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl_hours() -> f64 {
    24.0
}

fn default_similarity_threshold() -> f32 {
    0.95
}

fn default_max_memory_mb() -> u64 {
    256
}

fn default_compression_level() -> u32 {
    6
}

fn default_disk_cache_path() -> PathBuf {
    PathBuf::from("./.netquery-cache")
}

fn default_memory_eviction_threshold_fraction() -> f64 {
    0.9
}

fn default_cleanup_interval_minutes() -> f64 {
    15.0
}

fn default_disk_spill_fraction() -> f64 {
    0.05
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            ttl_hours: default_ttl_hours(),
            similarity_threshold: default_similarity_threshold(),
            max_memory_mb: default_max_memory_mb(),
            eviction_policy: EvictionPolicy::default(),
            compress_results: true,
            compression_level: default_compression_level(),
            persist_to_disk: false,
            disk_cache_path: default_disk_cache_path(),
            metrics_enabled: true,
            memory_eviction_threshold_fraction: default_memory_eviction_threshold_fraction(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
            disk_spill_fraction: default_disk_spill_fraction(),
        }
    }
}

impl QueryCacheConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get TTL as Duration
    pub fn ttl(&self) -> Duration {
        duration_from_secs(self.ttl_hours * 3600.0)
    }

    /// Get the cleanup interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        duration_from_secs(self.cleanup_interval_minutes * 60.0)
    }

    /// Memory ceiling in bytes
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Memory level above which eviction is triggered
    pub fn memory_eviction_threshold_bytes(&self) -> u64 {
        (self.max_memory_bytes() as f64 * self.memory_eviction_threshold_fraction) as u64
    }

    /// Entry size above which a payload is moved to disk
    pub fn disk_spill_threshold_bytes(&self) -> u64 {
        (self.max_memory_bytes() as f64 * self.disk_spill_fraction) as u64
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_ttl_hours(mut self, hours: f64) -> Self {
        self.ttl_hours = hours;
        self
    }

    /// Set the TTL from a Duration
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_hours = ttl.as_secs_f64() / 3600.0;
        self
    }

    /// Set the similarity threshold (clamped to 0.0..=1.0)
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_memory_mb(mut self, mb: u64) -> Self {
        self.max_memory_mb = mb;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress_results = enabled;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Enable disk spillover under the given directory
    pub fn with_disk_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_to_disk = true;
        self.disk_cache_path = path.into();
        self
    }

    pub fn with_metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn with_memory_eviction_threshold_fraction(mut self, fraction: f64) -> Self {
        self.memory_eviction_threshold_fraction = fraction;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_minutes = interval.as_secs_f64() / 60.0;
        self
    }

    pub fn with_disk_spill_fraction(mut self, fraction: f64) -> Self {
        self.disk_spill_fraction = fraction;
        self
    }
}

/// Seconds as a Duration; non-positive or NaN is zero, overflow saturates
fn duration_from_secs(secs: f64) -> Duration {
    if !(secs > 0.0) {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Whether a positive, finite number of seconds fits in a Duration
fn is_valid_duration_secs(secs: f64) -> bool {
    secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum CacheConfigValidationError {
    /// TTL is not a positive duration that fits in `Duration`
    InvalidTtl { hours: f64 },
    /// Entry ceiling is zero
    InvalidMaxEntries,
    /// Similarity threshold out of range
    InvalidSimilarityThreshold { value: f32 },
    /// Compression level out of range
    InvalidCompressionLevel { level: u32, min: u32, max: u32 },
    /// Memory ceiling is zero
    InvalidMaxMemory,
    /// A fraction setting is out of range
    InvalidFraction { field: &'static str, value: f64 },
    /// Cleanup interval is not a positive duration that fits in `Duration`
    InvalidCleanupInterval { minutes: f64 },
    /// Disk persistence enabled without a directory
    MissingDiskPath,
}

impl fmt::Display for CacheConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTtl { hours } => {
                write!(f, "Invalid ttlHours {}: must be a finite value greater than 0", hours)
            }
            Self::InvalidMaxEntries => write!(f, "maxEntries must be greater than 0"),
            Self::InvalidSimilarityThreshold { value } => {
                write!(
                    f,
                    "Invalid similarityThreshold {}: must be between 0.0 and 1.0",
                    value
                )
            }
            Self::InvalidCompressionLevel { level, min, max } => {
                write!(
                    f,
                    "Invalid compressionLevel {}: must be between {} and {}",
                    level, min, max
                )
            }
            Self::InvalidMaxMemory => write!(f, "maxMemoryMB must be greater than 0"),
            Self::InvalidFraction { field, value } => {
                write!(f, "Invalid {} {}: must be between 0.0 and 1.0", field, value)
            }
            Self::InvalidCleanupInterval { minutes } => {
                write!(
                    f,
                    "Invalid cleanupIntervalMinutes {}: must be a finite value greater than 0",
                    minutes
                )
            }
            Self::MissingDiskPath => {
                write!(f, "persistToDisk requires a non-empty diskCachePath")
            }
        }
    }
}

impl std::error::Error for CacheConfigValidationError {}

fn is_fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Validate a cache configuration, returning every problem found
pub fn validate_cache_config(
    config: &QueryCacheConfig,
) -> Result<(), Vec<CacheConfigValidationError>> {
    let mut errors = Vec::new();

    if !is_valid_duration_secs(config.ttl_hours * 3600.0) {
        errors.push(CacheConfigValidationError::InvalidTtl {
            hours: config.ttl_hours,
        });
    }

    if !(0.0..=1.0).contains(&config.similarity_threshold) {
        errors.push(CacheConfigValidationError::InvalidSimilarityThreshold {
            value: config.similarity_threshold,
        });
    }

    if !(1..=9).contains(&config.compression_level) {
        errors.push(CacheConfigValidationError::InvalidCompressionLevel {
            level: config.compression_level,
            min: 1,
            max: 9,
        });
    }

    if config.max_entries == 0 {
        errors.push(CacheConfigValidationError::InvalidMaxEntries);
    }

    if config.max_memory_mb == 0 {
        errors.push(CacheConfigValidationError::InvalidMaxMemory);
    }

    if !is_fraction(config.memory_eviction_threshold_fraction) {
        errors.push(CacheConfigValidationError::InvalidFraction {
            field: "memoryEvictionThresholdFraction",
            value: config.memory_eviction_threshold_fraction,
        });
    }

    if !is_fraction(config.disk_spill_fraction) {
        errors.push(CacheConfigValidationError::InvalidFraction {
            field: "diskSpillFraction",
            value: config.disk_spill_fraction,
        });
    }

    if !is_valid_duration_secs(config.cleanup_interval_minutes * 60.0) {
        errors.push(CacheConfigValidationError::InvalidCleanupInterval {
            minutes: config.cleanup_interval_minutes,
        });
    }

    if config.persist_to_disk && config.disk_cache_path.as_os_str().is_empty() {
        errors.push(CacheConfigValidationError::MissingDiskPath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueryCacheConfig::default();

        assert!(config.enabled);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.ttl(), Duration::from_secs(24 * 3600));
        assert!((config.similarity_threshold - 0.95).abs() < 0.001);
        assert_eq!(config.eviction_policy, EvictionPolicy::Recency);
        assert_eq!(config.compression_level, 6);
        assert!(!config.persist_to_disk);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(15 * 60));
        assert!(validate_cache_config(&config).is_ok());
    }

    #[test]
    fn test_memory_thresholds() {
        let config = QueryCacheConfig::new()
            .with_max_memory_mb(100)
            .with_memory_eviction_threshold_fraction(0.5);

        assert_eq!(config.max_memory_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.memory_eviction_threshold_bytes(), 50 * 1024 * 1024);
        assert_eq!(config.disk_spill_threshold_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_deserialize_camel_case_surface() {
        let json = serde_json::json!({
            "maxEntries": 50,
            "ttlHours": 0.5,
            "evictionPolicy": "frequency",
            "compressResults": false,
            "persistToDisk": true,
            "diskCachePath": "/tmp/netquery",
            "cleanupIntervalMinutes": 2.0
        });

        let config: QueryCacheConfig = serde_json::from_value(json).unwrap();

        assert_eq!(config.max_entries, 50);
        assert_eq!(config.ttl(), Duration::from_secs(1800));
        assert_eq!(config.eviction_policy, EvictionPolicy::Frequency);
        assert!(!config.compress_results);
        assert!(config.persist_to_disk);
        assert_eq!(config.disk_cache_path, PathBuf::from("/tmp/netquery"));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(120));
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_max_memory_key_and_lowercase_aliases() {
        let config: QueryCacheConfig =
            serde_json::from_value(serde_json::json!({ "maxMemoryMB": 64 })).unwrap();
        assert_eq!(config.max_memory_mb, 64);

        let config: QueryCacheConfig = serde_json::from_value(serde_json::json!({
            "maxmemorymb": 32,
            "maxentries": 7,
            "evictionpolicy": "size"
        }))
        .unwrap();
        assert_eq!(config.max_memory_mb, 32);
        assert_eq!(config.max_entries, 7);
        assert_eq!(config.eviction_policy, EvictionPolicy::Size);

        let serialized = serde_json::to_value(&config).unwrap();
        assert_eq!(serialized["maxMemoryMB"], 32);
    }

    #[test]
    fn test_similarity_threshold_clamped() {
        let config = QueryCacheConfig::new().with_similarity_threshold(1.5);
        assert!((config.similarity_threshold - 1.0).abs() < 0.001);

        let config = QueryCacheConfig::new().with_similarity_threshold(-0.5);
        assert!(config.similarity_threshold.abs() < 0.001);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = QueryCacheConfig::new()
            .with_ttl_hours(0.0)
            .with_compression_level(12)
            .with_max_memory_mb(0)
            .with_disk_spill_fraction(1.5);
        config.similarity_threshold = 2.0;

        let errors = validate_cache_config(&config).unwrap_err();

        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&CacheConfigValidationError::InvalidMaxMemory));
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("compressionLevel 12")));
    }

    #[test]
    fn test_validation_rejects_unrepresentable_durations() {
        let config = QueryCacheConfig::new()
            .with_ttl_hours(f64::INFINITY)
            .with_cleanup_interval(Duration::from_secs(60));
        let errors = validate_cache_config(&config).unwrap_err();
        assert!(matches!(errors[0], CacheConfigValidationError::InvalidTtl { .. }));

        let config: QueryCacheConfig =
            serde_json::from_value(serde_json::json!({ "ttlHours": 1e17 })).unwrap();
        assert!(validate_cache_config(&config).is_err());

        let mut config = QueryCacheConfig::new();
        config.cleanup_interval_minutes = f64::INFINITY;
        let errors = validate_cache_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            CacheConfigValidationError::InvalidCleanupInterval { .. }
        ));
    }

    #[test]
    fn test_durations_never_panic() {
        let mut config = QueryCacheConfig::new().with_ttl_hours(f64::INFINITY);
        config.cleanup_interval_minutes = 1e300;
        assert_eq!(config.ttl(), Duration::MAX);
        assert_eq!(config.cleanup_interval(), Duration::MAX);

        let mut config = QueryCacheConfig::new().with_ttl_hours(f64::NAN);
        config.cleanup_interval_minutes = -5.0;
        assert_eq!(config.ttl(), Duration::ZERO);
        assert_eq!(config.cleanup_interval(), Duration::ZERO);
    }

    #[test]
    fn test_validation_rejects_zero_max_entries() {
        let errors = validate_cache_config(&QueryCacheConfig::new().with_max_entries(0)).unwrap_err();

        assert_eq!(errors, vec![CacheConfigValidationError::InvalidMaxEntries]);
    }

    #[test]
    fn test_validation_nan_ttl() {
        let config = QueryCacheConfig::new().with_ttl_hours(f64::NAN);
        let errors = validate_cache_config(&config).unwrap_err();

        assert!(matches!(errors[0], CacheConfigValidationError::InvalidTtl { .. }));
    }
}
