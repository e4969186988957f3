//! Embedding capability consumed by the semantic lookup path

mod provider;
mod similarity;

pub use provider::EmbeddingProvider;
pub use similarity::cosine_similarity;

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
