//! Netquery Cache
//!
//! An in-process result cache for expensive network-analysis queries with:
//! - Exact lookup by a composite key over query text and network scope
//! - Semantic lookup of paraphrased queries through an embedding provider
//! - Gzip compression and disk spillover for large results
//! - Recency, frequency and size eviction under entry and memory ceilings
//! - Periodic expiry sweeps and a flat metrics snapshot

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{DomainError, QueryCacheConfig, QueryScope};
pub use infrastructure::query_cache::{CleanupScheduler, QueryResultCache};
