//! Query result cache implementation
//!
//! [`QueryResultCache`] is the entry point. It owns one [`CacheState`] lock
//! holding the entry table and the similarity index, plus the codec, the
//! optional disk overflow store and the metrics collector.

mod codec;
mod disk;
mod eviction;
mod metrics;
mod scheduler;
mod similarity_index;
mod state;
mod store;

pub use codec::{is_gzip, PayloadCodec};
pub use disk::{DiskOverflowStore, PendingSpill};
pub use eviction::{EvictionController, EvictionOutcome, MAX_MEMORY_EVICTIONS_PER_INSERT};
pub use metrics::{MetricsCollector, StoreGauges};
pub use scheduler::CleanupScheduler;
pub use similarity_index::{SimilarityIndex, SimilarityMatch};
pub use state::CacheState;
pub use store::QueryResultCache;
