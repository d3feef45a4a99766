//! Per-process cache for question embeddings.
//!
//! Identical questions asked against the same model and output width reuse
//! the stored vector instead of paying for another remote call. The cache is bounded
//! and evicts the oldest insertion first.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::Embedding;
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Embedding,
    inserted: u64,
}

/// `(model, dimension, text)`.
type CacheKey = (String, usize, String);

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

/// Bounded map from `(model, dimension, text)` to a computed vector.
pub struct EmbeddingCache {
    inner: RwLock<CacheInner>,
    max_entries: usize,
}

impl EmbeddingCache {
    /// Cache holding at most `max_entries` vectors (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a vector, counting the hit or miss.
    pub async fn get(&self, text: &str, model: &str, dimension: usize) -> Option<Embedding> {
        let mut inner = self.inner.write().await;
        let found = inner
            .entries
            .get(&(model.to_string(), dimension, text.to_string()))
            .map(|e| e.embedding.clone());
        match found {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        found
    }

    /// Store a vector, evicting the oldest entry when full.
    pub async fn put(&self, text: &str, model: &str, dimension: usize, embedding: Embedding) {
        let mut inner = self.inner.write().await;

        let key = (model.to_string(), dimension, text.to_string());
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            if let Some(oldest_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, v)| v.inserted)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest_key);
            }
        }

        let inserted = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key,
            CacheEntry {
                embedding,
                inserted,
            },
        );
        debug!(model, entries = inner.entries.len(), "Stored question embedding");
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,

    /// Lookups served from the cache.
    pub hits: u64,

    /// Lookups that went to the provider.
    pub misses: u64,
}

/// Serves repeated question text from an [`EmbeddingCache`] before
/// asking the wrapped provider.
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<P> EmbeddingProvider for CachedProvider<P>
where
    P: EmbeddingProvider,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    fn default_dimension(&self) -> usize {
        self.provider.default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());
        let dimension = request
            .dimensions
            .unwrap_or_else(|| self.provider.default_dimension());

        if let Some(embedding) = self.cache.get(&request.text, &model, dimension).await {
            debug!(model = %model, "Question embedding served from cache");
            return Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model,
                tokens_used: None,
            });
        }

        let text = request.text.clone();
        let response = self.provider.embed(request).await?;
        self.cache
            .put(&text, &model, dimension, response.embedding.clone())
            .await;

        Ok(response)
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "count-1"
        }

        fn default_dimension(&self) -> usize {
            2
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let width = request.dimensions.unwrap_or(2);
            let mut embedding = vec![1.0; width];
            embedding[0] = request.text.len() as f32;
            Ok(EmbeddingResponse {
                embedding,
                model: "count-1".to_string(),
                dimension: width,
                tokens_used: None,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_lookup_is_keyed_by_model() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("hello", "model-1", 3, embedding.clone()).await;

        assert_eq!(cache.get("hello", "model-1", 3).await, Some(embedding));
        assert_eq!(cache.get("hello", "model-2", 3).await, None);
        assert_eq!(cache.get("hello", "model-1", 768).await, None);
    }

    #[tokio::test]
    async fn test_cache_eviction_drops_oldest() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", 1, vec![1.0]).await;
        cache.put("b", "model", 1, vec![2.0]).await;
        cache.put("c", "model", 1, vec![3.0]).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(cache.get("a", "model", 1).await, None);
        assert_eq!(cache.get("c", "model", 1).await, Some(vec![3.0]));
    }

    #[tokio::test]
    async fn test_cached_provider_reuses_identical_text() {
        let provider = CachedProvider::new(
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
            EmbeddingCache::new(10),
        );

        let first = provider.embed(EmbeddingRequest::new("zanzibar")).await.unwrap();
        let second = provider.embed(EmbeddingRequest::new("zanzibar")).await.unwrap();
        provider.embed(EmbeddingRequest::new("mombasa")).await.unwrap();

        assert_eq!(first.embedding, second.embedding);
        assert_eq!(provider.provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.cache().stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_cached_provider_keys_on_requested_width() {
        let provider = CachedProvider::new(
            CountingProvider {
                calls: AtomicUsize::new(0),
            },
            EmbeddingCache::new(10),
        );

        let default_width = provider.embed(EmbeddingRequest::new("pemba")).await.unwrap();
        let wide = provider
            .embed(EmbeddingRequest::new("pemba").with_dimensions(4))
            .await
            .unwrap();

        assert_eq!(default_width.embedding.len(), 2);
        assert_eq!(wide.embedding.len(), 4);
        assert_eq!(provider.provider.calls.load(Ordering::SeqCst), 2);
    }
}
