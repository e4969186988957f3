//! Similarity index over entry embeddings
//!
//! A flat list mirrored from the entry table: every entry that carries an
//! embedding has exactly one record here. Lookups are a linear cosine scan,
//! so the index is bounded by the same ceilings as the table itself.

use crate::domain::embedding::cosine_similarity;
use crate::domain::query_cache::{CompositeKey, QueryScope};

#[derive(Debug, Clone)]
struct IndexedEmbedding {
    key: CompositeKey,
    scope: QueryScope,
    embedding: Vec<f32>,
}

/// Best candidate found by a scan
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    pub key: CompositeKey,
    pub similarity: f32,
}

#[derive(Debug, Default)]
pub struct SimilarityIndex {
    items: Vec<IndexedEmbedding>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &CompositeKey) -> bool {
        self.items.iter().any(|item| &item.key == key)
    }

    /// Add or replace the embedding for a key
    pub fn insert(&mut self, key: CompositeKey, scope: QueryScope, embedding: Vec<f32>) {
        self.remove(&key);
        self.items.push(IndexedEmbedding {
            key,
            scope,
            embedding,
        });
    }

    /// Remove the embedding for a key, returning whether it was present
    pub fn remove(&mut self, key: &CompositeKey) -> bool {
        match self.items.iter().position(|item| &item.key == key) {
            Some(pos) => {
                self.items.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Scan for the most similar live entry admitted by `scope`
    ///
    /// `is_live` filters out candidates the caller considers expired.
    /// Returns `None` unless the best score meets `threshold`.
    pub fn find_best_match<F>(
        &self,
        embedding: &[f32],
        scope: &QueryScope,
        threshold: f32,
        is_live: F,
    ) -> Option<SimilarityMatch>
    where
        F: Fn(&CompositeKey) -> bool,
    {
        let mut best: Option<SimilarityMatch> = None;

        for item in &self.items {
            if !scope.admits(&item.scope) || !is_live(&item.key) {
                continue;
            }

            let similarity = cosine_similarity(embedding, &item.embedding);

            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(SimilarityMatch {
                    key: item.key.clone(),
                    similarity,
                });
            }
        }

        best.filter(|b| b.similarity >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query_cache::CompositeKeyGenerator;

    fn key(query: &str) -> CompositeKey {
        CompositeKeyGenerator::new("index-test").generate(query, &QueryScope::default())
    }

    fn scope(network: &str) -> QueryScope {
        QueryScope::new(network, "snap")
    }

    #[test]
    fn test_best_match_above_threshold() {
        let mut index = SimilarityIndex::new();
        index.insert(key("similar"), scope("n"), vec![1.0, 0.1, 0.0]);
        index.insert(key("different"), scope("n"), vec![0.0, 1.0, 0.0]);

        let found = index
            .find_best_match(&[1.0, 0.0, 0.0], &scope("n"), 0.95, |_| true)
            .unwrap();

        assert_eq!(found.key, key("similar"));
        assert!(found.similarity > 0.99);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut index = SimilarityIndex::new();
        index.insert(key("a"), scope("n"), vec![1.0, 0.0]);

        assert!(index
            .find_best_match(&[1.0, 0.0], &scope("n"), 1.0, |_| true)
            .is_some());
        assert!(index
            .find_best_match(&[0.0, 1.0], &scope("n"), 0.5, |_| true)
            .is_none());
    }

    #[test]
    fn test_scope_filter() {
        let mut index = SimilarityIndex::new();
        index.insert(key("a"), scope("net-A"), vec![1.0, 0.0]);

        assert!(index
            .find_best_match(&[1.0, 0.0], &scope("net-B"), 0.5, |_| true)
            .is_none());
        assert!(index
            .find_best_match(&[1.0, 0.0], &QueryScope::default(), 0.5, |_| true)
            .is_some());
    }

    #[test]
    fn test_dead_entries_skipped() {
        let mut index = SimilarityIndex::new();
        let dead = key("dead");
        index.insert(dead.clone(), scope("n"), vec![1.0, 0.0]);
        index.insert(key("live"), scope("n"), vec![0.9, 0.3]);

        let found = index
            .find_best_match(&[1.0, 0.0], &scope("n"), 0.5, |k| k != &dead)
            .unwrap();

        assert_eq!(found.key, key("live"));
    }

    #[test]
    fn test_insert_replaces_and_remove() {
        let mut index = SimilarityIndex::new();
        index.insert(key("a"), scope("n"), vec![1.0]);
        index.insert(key("a"), scope("n"), vec![0.5]);

        assert_eq!(index.len(), 1);
        assert!(index.remove(&key("a")));
        assert!(!index.remove(&key("a")));
        assert!(index.is_empty());
    }
}
