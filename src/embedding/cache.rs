/// Process-wide query embedding cache with LRU eviction
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

/// Maps an exact query string to its embedding.
///
/// Bounded: once `capacity` entries are cached, the least recently used query is evicted.
pub struct QueryEmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a query, marking it as recently used
    pub async fn get(&self, query: &str) -> Option<Vec<f32>> {
        let mut guard = self.entries.lock().await;
        guard.get(query).cloned()
    }

    pub async fn insert(&self, query: String, embedding: Vec<f32>) {
        let mut guard = self.entries.lock().await;
        guard.put(query, embedding);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_key_lookup() {
        let cache = QueryEmbeddingCache::new(4);
        cache.insert("What is beta?".to_string(), vec![1.0, 0.0]).await;

        assert_eq!(cache.get("What is beta?").await, Some(vec![1.0, 0.0]));
        assert!(cache.get("what is beta?").await.is_none());
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = QueryEmbeddingCache::new(2);
        cache.insert("a".to_string(), vec![1.0]).await;
        cache.insert("b".to_string(), vec![2.0]).await;

        // touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").await.is_some());
        cache.insert("c".to_string(), vec![3.0]).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let cache = QueryEmbeddingCache::new(0);
        assert_eq!(cache.capacity().await, 1);
        assert!(cache.is_empty().await);
    }
}
