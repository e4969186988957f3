//! Embedding provider implementations

mod hashing;

pub use hashing::HashingEmbeddingProvider;
