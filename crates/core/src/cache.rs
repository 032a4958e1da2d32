use crate::error::QueryError;
use crate::models::Answer;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache keyed by embedding similarity of the question rather than exact
/// text equality. Eviction and persistence belong to the backing store, not
/// to this core.
#[async_trait]
pub trait SemanticCacheStore: Send + Sync {
    /// Returns the cached answer of the closest prior question when its
    /// cosine similarity reaches `threshold`.
    async fn lookup(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<Answer>, QueryError>;

    async fn store(&self, embedding: Vec<f32>, answer: Answer) -> Result<(), QueryError>;
}

#[async_trait]
impl<T> SemanticCacheStore for Arc<T>
where
    T: SemanticCacheStore + ?Sized,
{
    async fn lookup(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<Answer>, QueryError> {
        (**self).lookup(embedding, threshold).await
    }

    async fn store(&self, embedding: Vec<f32>, answer: Answer) -> Result<(), QueryError> {
        (**self).store(embedding, answer).await
    }
}

struct CacheEntry {
    embedding: Vec<f32>,
    answer: Answer,
}

/// Process-local semantic cache. Concurrent writers on a miss may both
/// append; lookup picks the best match, so last-write-wins is the observable
/// outcome.
#[derive(Default)]
pub struct InMemorySemanticCache {
    entries: RwLock<Vec<CacheEntry>>,
}

impl InMemorySemanticCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SemanticCacheStore for InMemorySemanticCache {
    async fn lookup(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<Answer>, QueryError> {
        let entries = self.entries.read().await;

        let best = entries
            .iter()
            .map(|entry| (cosine_similarity(&entry.embedding, embedding), entry))
            .max_by(|(left, _), (right, _)| left.total_cmp(right));

        Ok(best.and_then(|(similarity, entry)| {
            (similarity >= threshold).then(|| entry.answer.clone())
        }))
    }

    async fn store(&self, embedding: Vec<f32>, answer: Answer) -> Result<(), QueryError> {
        self.entries
            .write()
            .await
            .push(CacheEntry { embedding, answer });
        Ok(())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_mag: f32 = left.iter().map(|v| v * v).sum::<f32>().sqrt();
    let right_mag: f32 = right.iter().map(|v| v * v).sum::<f32>().sqrt();

    if left_mag == 0.0 || right_mag == 0.0 {
        return 0.0;
    }

    dot / (left_mag * right_mag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> Answer {
        Answer {
            text: text.to_string(),
            sources: vec!["hr/policy.md".to_string()],
            contexts: vec!["context".to_string()],
        }
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let vector = vec![0.3, 0.5, 0.2];
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_never_match() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn lookup_hits_at_or_above_threshold() {
        let cache = InMemorySemanticCache::new();
        cache
            .store(vec![1.0, 0.0, 0.0], answer("twenty days"))
            .await
            .unwrap();

        let hit = cache.lookup(&[1.0, 0.0, 0.0], 0.98).await.unwrap();
        assert_eq!(hit.map(|a| a.text), Some("twenty days".to_string()));
    }

    #[tokio::test]
    async fn lookup_misses_below_threshold() {
        let cache = InMemorySemanticCache::new();
        cache
            .store(vec![1.0, 0.0, 0.0], answer("twenty days"))
            .await
            .unwrap();

        // ~0.7 similarity, well under the 0.98 default.
        let miss = cache.lookup(&[1.0, 1.0, 0.0], 0.98).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn lookup_on_empty_cache_is_a_miss() {
        let cache = InMemorySemanticCache::new();
        assert!(cache.lookup(&[1.0, 0.0], 0.5).await.unwrap().is_none());
    }
}
