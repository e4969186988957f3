//! Domain layer - Core types and capability traits

pub mod embedding;
pub mod error;
pub mod query_cache;

pub use embedding::{cosine_similarity, EmbeddingProvider};
pub use error::DomainError;
pub use query_cache::{
    validate_cache_config, CacheConfigValidationError, CacheStats, CachedResult, CompositeKey,
    EvictionPolicy, MatchKind, QueryCacheConfig, QueryScope,
};
