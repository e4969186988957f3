//! Embedding provider trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Capability that turns query text into a fixed-length vector
///
/// Implementations must fail on empty input. The cache treats every error
/// from this trait as a degradation to exact-match caching, never as fatal.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Get the embedding dimensions
    fn dimensions(&self) -> usize;
}
