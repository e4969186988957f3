//! Deterministic feature-hashing embedding provider
//!
//! Projects lowercase word tokens into a fixed number of buckets with a
//! signed hash and L2-normalizes the result. Queries that share most of
//! their words land close together, which is enough to recognize simple
//! paraphrases without a model server.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;

const DEFAULT_DIMENSIONS: usize = 256;

/// Offline embedding provider based on token hashing
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider with the default number of dimensions
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS)
    }

    /// Create a provider with a custom number of dimensions
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in Self::tokens(text) {
            let hash = Self::hash_token(&token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::embedding(
                self.provider_name(),
                "cannot embed empty text",
            ));
        }

        Ok(self.project(text))
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
